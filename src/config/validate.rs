// src/config/validate.rs

use crate::config::model::{
    DEFAULT_EXEC_TIMEOUT, DEFAULT_RELAY, DEFAULT_RELAY_TIMEOUT, HookConfig, ServerConfig,
};
use crate::errors::{Result, ServerError};

/// Validate a loaded configuration and fill in defaults, in place.
///
/// This checks:
/// - the application `command` is non-empty
/// - `on_init` / `after_init`, when present, have a non-empty `command`
///
/// and defaults:
/// - `relay` to `"pipes"`
/// - `relay_timeout` to 60s
/// - each present hook's `exec_timeout` to one minute
pub fn validate_config(cfg: &mut ServerConfig) -> Result<()> {
    if cfg.command.is_empty() {
        return Err(ServerError::validation("command must not be empty"));
    }

    if cfg.relay.is_empty() {
        cfg.relay = DEFAULT_RELAY.to_string();
    }

    if cfg.relay_timeout.is_zero() {
        cfg.relay_timeout = DEFAULT_RELAY_TIMEOUT;
    }

    if let Some(hook) = cfg.after_init.as_mut() {
        validate_hook("after_init", hook)?;
    }

    if let Some(hook) = cfg.on_init.as_mut() {
        validate_hook("on_init", hook)?;
    }

    // `user = ""` in TOML means "not set".
    cfg.user = cfg.user.take().filter(|u| !u.is_empty());
    cfg.group = cfg.group.take().filter(|g| !g.is_empty());

    Ok(())
}

fn validate_hook(name: &str, hook: &mut HookConfig) -> Result<()> {
    if hook.command.is_empty() {
        return Err(ServerError::Validation(format!(
            "{name} command must not be empty"
        )));
    }

    if hook.exec_timeout.is_zero() {
        hook.exec_timeout = DEFAULT_EXEC_TIMEOUT;
    }

    Ok(())
}
