// src/exec/identity.rs

//! Resolution of the configured `user` / `group` into numeric ids.

use tracing::debug;

use crate::errors::{Result, ServerError};

/// Numeric identity a process is started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Resolve `user` and `group` names.
///
/// Returns `Ok(None)` when neither is configured. With only a user, the
/// user's primary group is used. Unknown names are an
/// [`ServerError::IdentityResolution`] error.
#[cfg(unix)]
pub fn resolve_identity(user: Option<&str>, group: Option<&str>) -> Result<Option<Identity>> {
    use nix::unistd::{Group, User};

    if user.is_none() && group.is_none() {
        return Ok(None);
    }

    let mut identity = Identity { uid: None, gid: None };

    if let Some(name) = user {
        let found = User::from_name(name).map_err(|e| identity_error("user", name, e))?;
        let Some(found) = found else {
            return Err(identity_error("user", name, "no such user"));
        };
        identity.uid = Some(found.uid.as_raw());
        identity.gid = Some(found.gid.as_raw());
    }

    if let Some(name) = group {
        let found = Group::from_name(name).map_err(|e| identity_error("group", name, e))?;
        let Some(found) = found else {
            return Err(identity_error("group", name, "no such group"));
        };
        identity.gid = Some(found.gid.as_raw());
    }

    debug!(?user, ?group, uid = ?identity.uid, gid = ?identity.gid, "resolved process identity");
    Ok(Some(identity))
}

#[cfg(not(unix))]
pub fn resolve_identity(user: Option<&str>, group: Option<&str>) -> Result<Option<Identity>> {
    match (user, group) {
        (None, None) => Ok(None),
        (Some(name), _) => Err(identity_error("user", name, "not supported on this platform")),
        (None, Some(name)) => Err(identity_error("group", name, "not supported on this platform")),
    }
}

fn identity_error(field: &'static str, name: &str, reason: impl ToString) -> ServerError {
    ServerError::IdentityResolution {
        field,
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
