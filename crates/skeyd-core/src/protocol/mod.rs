// ── Wire protocols ──
//
// `notification`: inbound UDP button-press datagrams (parse only).
// `registration`: outbound management request that points a device at us.

pub mod notification;
pub mod registration;

/// Fixed `BUTTON` value carried by both directions of the protocol.
pub const BUTTON_SCAN: &str = "SCAN";
