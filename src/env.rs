// src/env.rs

//! Environment interpolation and preparation.
//!
//! Configured values may reference variables of the surrounding environment
//! as `$NAME` or `${NAME}`. Lookups go through [`EnvLookup`] so tests can pass
//! a plain map instead of touching the process environment.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;

use tracing::debug;

/// Read access to an environment.
pub trait EnvLookup: Send + Sync {
    /// Value of `name`, or `None` if it is not set.
    fn get(&self, name: &str) -> Option<String>;

    /// Every variable, in the order they should be appended to a child
    /// process environment. Names and values need not be UTF-8.
    fn vars(&self) -> Vec<(OsString, OsString)>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        std::env::vars_os().collect()
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        BTreeMap::get(self, name).cloned()
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        self.iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        self.iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

/// `(KEY, value)` pairs built from the server `env` section.
///
/// Entries follow the sorted order of the configured keys. Built once per
/// configuration and shared read-only by every spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedEnv(Vec<(String, String)>);

impl PreparedEnv {
    /// Entries rendered as `KEY=value`.
    pub fn entries(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the rendered `KEY=value` form of some entry equals `entry`.
    pub fn contains(&self, entry: &str) -> bool {
        self.0.iter().any(|(k, v)| {
            entry
                .strip_prefix(k.as_str())
                .and_then(|rest| rest.strip_prefix('='))
                == Some(v.as_str())
        })
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Interpolate and normalise the configured environment.
///
/// Each `(key, value)` becomes `UPPER(key)=interpolate(value)`.
pub fn prepare_environment(env: &BTreeMap<String, String>, lookup: &dyn EnvLookup) -> PreparedEnv {
    let entries: Vec<(String, String)> = env
        .iter()
        .map(|(key, value)| (key.to_uppercase(), interpolate(value, lookup)))
        .collect();

    debug!(count = entries.len(), "prepared environment");
    PreparedEnv(entries)
}

/// Replace `$NAME` and `${NAME}` references with values from `lookup`.
///
/// Unset variables expand to the empty string. Substituted values are not
/// expanded again. Rules for the odd cases:
/// - `$` followed by a shell special character (`*#$@!?-` or a digit) names
///   that single character.
/// - `${}` is dropped; an unterminated `${` is dropped and the rest is kept.
/// - `$` that does not start a name, and a trailing `$`, are kept literally.
pub fn interpolate(value: &str, lookup: &dyn EnvLookup) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut copied = 0;
    let mut j = 0;

    while j < bytes.len() {
        if bytes[j] == b'$' && j + 1 < bytes.len() {
            out.push_str(&value[copied..j]);
            let (name, width) = shell_name(&value[j + 1..]);
            match name {
                Some(name) => out.push_str(&lookup.get(name).unwrap_or_default()),
                // Bad syntax: the consumed characters are dropped.
                None if width > 0 => {}
                None => out.push('$'),
            }
            j += width;
            copied = j + 1;
        }
        j += 1;
    }

    out.push_str(&value[copied..]);
    out
}

/// Parse the variable name following a `$`.
///
/// Returns the name (if any) and how many bytes after the `$` were consumed.
/// `(None, 0)` means "not a reference"; `(None, n)` with `n > 0` means bad
/// syntax whose `n` bytes are discarded.
fn shell_name(s: &str) -> (Option<&str>, usize) {
    let bytes = s.as_bytes();

    if bytes[0] == b'{' {
        if bytes.len() > 2 && is_special(bytes[1]) && bytes[2] == b'}' {
            return (Some(&s[1..2]), 3);
        }
        return match bytes.iter().skip(1).position(|&b| b == b'}') {
            Some(0) => (None, 2),
            Some(i) => (Some(&s[1..i + 1]), i + 2),
            None => (None, 1),
        };
    }

    if is_special(bytes[0]) {
        return (Some(&s[0..1]), 1);
    }

    let len = bytes.iter().take_while(|&&b| is_name_char(b)).count();
    if len == 0 {
        (None, 0)
    } else {
        (Some(&s[..len]), len)
    }
}

fn is_special(b: u8) -> bool {
    matches!(b, b'*' | b'#' | b'$' | b'@' | b'!' | b'?' | b'-' | b'0'..=b'9')
}

fn is_name_char(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}
