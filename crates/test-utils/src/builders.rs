#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use srvhooks::config::{HookConfig, ServerConfig};

/// Builder for `ServerConfig` to simplify test setup.
///
/// The result is *not* validated; tests decide whether to run
/// `validate_config` or hand it to `Server`.
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// An empty `command` leaves the command list empty.
    pub fn new(command: &str) -> Self {
        let command = if command.is_empty() {
            Vec::new()
        } else {
            vec![command.to_string()]
        };
        Self {
            config: ServerConfig {
                command,
                ..ServerConfig::default()
            },
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.config.user = Some(user.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.config.group = Some(group.to_string());
        self
    }

    pub fn on_init(mut self, hook: HookConfig) -> Self {
        self.config.on_init = Some(hook);
        self
    }

    pub fn after_init(mut self, hook: HookConfig) -> Self {
        self.config.after_init = Some(hook);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Builder for `HookConfig`.
pub struct HookConfigBuilder {
    hook: HookConfig,
}

impl HookConfigBuilder {
    /// Command in the single-string form, e.g. `"sh -c exit"`.
    pub fn new(command: &str) -> Self {
        Self::from_parts(&[command])
    }

    /// Command in the list form, e.g. `["sh", "-c", "echo hi"]`.
    pub fn from_parts(parts: &[&str]) -> Self {
        Self {
            hook: HookConfig {
                command: parts.iter().map(|s| s.to_string()).collect(),
                exec_timeout: Duration::ZERO,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.hook.exec_timeout = timeout;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.hook.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> HookConfig {
        self.hook
    }
}
