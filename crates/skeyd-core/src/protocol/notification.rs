//! Button-press notification parser.
//!
//! A notification is a Latin-1 datagram that carries, somewhere after an
//! arbitrary binary preamble, a `;`-delimited `KEY=VALUE` list anchored at
//! [`MARKER`]:
//!
//! ```text
//! ....TYPE=BR;BUTTON=SCAN;USER="PDF ADF";FUNC=FILE;HOST=203.0.113.5:54925;APPNUM=5;SEQ=7;
//! ```
//!
//! [`parse_notification`] is total: malformed input yields a [`Rejection`],
//! never a panic, and nothing here logs above `debug`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

use super::BUTTON_SCAN;
use crate::model::{ActionCategory, ScanEvent};

/// Start of the structured field list.
pub const MARKER: &str = "TYPE=BR;";

/// Why a datagram was not accepted as a notification.
///
/// Rejections are dropped by the reactor; they never propagate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no TYPE=BR; marker")]
    MissingMarker,

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("unexpected BUTTON value '{0}'")]
    UnexpectedButton(String),

    #[error("unknown FUNC '{0}'")]
    UnknownFunction(String),

    #[error("APPNUM '{0}' is not an integer")]
    InvalidAppNum(String),

    #[error("APPNUM {app_num} does not match FUNC {function}")]
    AppNumMismatch {
        function: ActionCategory,
        app_num: u32,
    },

    #[error("HOST '{0}' is not ip:port")]
    InvalidHost(String),

    #[error("HOST {received} is not this dispatcher ({expected})")]
    WrongTarget {
        expected: SocketAddr,
        received: SocketAddr,
    },
}

/// Decode and validate a raw datagram addressed to `bound`.
pub fn parse_notification(payload: &[u8], bound: SocketAddr) -> Result<ScanEvent, Rejection> {
    // Latin-1: every byte is exactly one char.
    let text: String = payload.iter().copied().map(char::from).collect();
    let start = text.find(MARKER).ok_or(Rejection::MissingMarker)?;
    let fields = split_fields(&text[start + MARKER.len()..]);

    let button = required(&fields, "BUTTON")?;
    if button != BUTTON_SCAN {
        return Err(Rejection::UnexpectedButton(button.to_owned()));
    }

    let func = required(&fields, "FUNC")?;
    let function =
        ActionCategory::from_str(func).map_err(|_| Rejection::UnknownFunction(func.to_owned()))?;

    let app_num_raw = required(&fields, "APPNUM")?;
    let app_num: u32 = app_num_raw
        .parse()
        .map_err(|_| Rejection::InvalidAppNum(app_num_raw.to_owned()))?;
    if app_num != function.app_num() {
        return Err(Rejection::AppNumMismatch { function, app_num });
    }

    let host = required(&fields, "HOST")?;
    let target = parse_host(host).ok_or_else(|| Rejection::InvalidHost(host.to_owned()))?;
    if target != bound {
        return Err(Rejection::WrongTarget {
            expected: bound,
            received: target,
        });
    }

    let user = required(&fields, "USER")?
        .trim_matches(|c: char| c == '"' || c == '\'')
        .to_owned();
    let sequence = required(&fields, "SEQ")?.to_owned();

    Ok(ScanEvent {
        function,
        user,
        target,
        sequence,
    })
}

/// Split `K=V;K=V;...` on the first `=` of each segment. Segments without
/// `=` are ignored; the first occurrence of a key wins.
fn split_fields(list: &str) -> HashMap<&str, &str> {
    let mut fields = HashMap::new();
    for (key, value) in list.split(';').filter_map(|seg| seg.split_once('=')) {
        fields
            .entry(key.trim())
            .or_insert_with(|| value.trim_matches(|c: char| c.is_whitespace() || c == '\0'));
    }
    fields
}

fn required<'a>(fields: &HashMap<&str, &'a str>, key: &'static str) -> Result<&'a str, Rejection> {
    match fields.get(key) {
        Some(value) if !value.is_empty() => Ok(*value),
        _ => Err(Rejection::MissingField(key)),
    }
}

/// `ip:port`, splitting on the last colon so bare IPv6 literals also work.
fn parse_host(host: &str) -> Option<SocketAddr> {
    let (ip, port) = host.rsplit_once(':')?;
    let ip: IpAddr = ip.trim_start_matches('[').trim_end_matches(']').parse().ok()?;
    let port: u16 = port.parse().ok()?;
    Some(SocketAddr::new(ip, port))
}

// ── Tests ────────────────────────────────────────────────────────────
