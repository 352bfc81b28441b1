// ── Privilege reduction ──
//
// Switch to the configured account before anything is bound or spawned.
// Group first: once the uid is gone, setgid is no longer permitted.

use nix::unistd::{Gid, Group, Uid, User, setgid, setgroups, setuid};
use tracing::{debug, info};

use crate::error::CliError;

/// Drop to `user` and/or `group`. No-op when neither is configured.
///
/// Without an explicit group the user's primary group is used.
pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<(), CliError> {
    if user.is_none() && group.is_none() {
        return Ok(());
    }

    let target_user = user.map(lookup_user).transpose()?;
    let target_gid: Option<Gid> = match group {
        Some(name) => Some(lookup_group(name)?.gid),
        None => target_user.as_ref().map(|u| u.gid),
    };

    if let Some(gid) = target_gid {
        if Uid::effective().is_root() {
            setgroups(&[gid]).map_err(|e| failure(&format!("gid {gid}"), e))?;
        }
        setgid(gid).map_err(|e| failure(&format!("gid {gid}"), e))?;
        debug!(%gid, "group switched");
    }

    if let Some(user) = &target_user {
        setuid(user.uid).map_err(|e| failure(&user.name, e))?;
    }

    info!(
        uid = %Uid::current(),
        gid = %Gid::current(),
        "running with reduced privileges"
    );
    Ok(())
}

fn lookup_user(name: &str) -> Result<User, CliError> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(CliError::PrivilegeDrop {
            account: format!("user '{name}'"),
            reason: "no such user".into(),
        }),
        Err(e) => Err(failure(&format!("user '{name}'"), e)),
    }
}

fn lookup_group(name: &str) -> Result<Group, CliError> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group),
        Ok(None) => Err(CliError::PrivilegeDrop {
            account: format!("group '{name}'"),
            reason: "no such group".into(),
        }),
        Err(e) => Err(failure(&format!("group '{name}'"), e)),
    }
}

fn failure(account: &str, errno: nix::errno::Errno) -> CliError {
    CliError::PrivilegeDrop {
        account: account.to_owned(),
        reason: errno.desc().to_owned(),
    }
}
