// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default relay when none is configured.
pub const DEFAULT_RELAY: &str = "pipes";

/// Default time the relay factory waits for a worker connection.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default execution budget for `on_init` / `after_init` commands.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Top-level server configuration as read from a TOML file.
///
/// ```toml
/// command = "php worker.php"
/// user = "www-data"
/// relay = "pipes"
/// relay_timeout = "60s"
///
/// [env]
/// database_url = "mysql://${MYSQL_USER}@${MYSQL_HOST}"
///
/// [on_init]
/// command = ["php", "migrate.php"]
/// exec_timeout = "30s"
/// ```
///
/// Run [`validate_config`](crate::config::validate_config) before using it;
/// that is where defaults are filled in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Application command, either `"php worker.php"` or `["php", "worker.php"]`.
    #[serde(default, deserialize_with = "string_or_seq")]
    pub command: Vec<String>,

    /// User to run processes under.
    #[serde(default)]
    pub user: Option<String>,

    /// Group to run processes under.
    #[serde(default)]
    pub group: Option<String>,

    /// Unprocessed environment overrides. Values may reference OS variables
    /// as `$NAME` or `${NAME}`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Connection method for workers: `"pipes"`, `"tcp://:6001"`,
    /// `"unix://rr.sock"`. Only defaulted here; the relay layer consumes it.
    #[serde(default)]
    pub relay: String,

    /// How long the relay factory waits for a worker connection.
    #[serde(default, deserialize_with = "duration")]
    pub relay_timeout: Duration,

    /// Command run before the worker pool is built.
    #[serde(default)]
    pub on_init: Option<HookConfig>,

    /// Command run after the worker pool is built.
    #[serde(default)]
    pub after_init: Option<HookConfig>,
}

/// `[on_init]` / `[after_init]` sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookConfig {
    #[serde(default, deserialize_with = "string_or_seq")]
    pub command: Vec<String>,

    /// Zero means "not set"; validation replaces it with one minute.
    #[serde(default, deserialize_with = "duration")]
    pub exec_timeout: Duration,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrSeq {
    One(String),
    Many(Vec<String>),
}

fn string_or_seq<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrSeq::deserialize(de)? {
        StringOrSeq::One(s) if s.is_empty() => Vec::new(),
        StringOrSeq::One(s) => vec![s],
        StringOrSeq::Many(v) => v,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Secs(u64),
    Text(String),
}

fn duration<'de, D>(de: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(de)? {
        RawDuration::Secs(s) => Ok(Duration::from_secs(s)),
        RawDuration::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60),
        "h" => scaled_secs(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn scaled_secs(value: u64, factor: u64) -> Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: {value} x {factor}s"))
}
