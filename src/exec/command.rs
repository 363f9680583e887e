// src/exec/command.rs

//! Turning a command declaration into something that can be spawned.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::process::Stdio;

use tokio::process::Command;

use crate::env::{EnvLookup, PreparedEnv, interpolate};
use crate::errors::{Result, ServerError};
use crate::exec::identity::Identity;

/// Fully resolved description of a process to start.
///
/// Built fresh for every spawn and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment in application order; a later entry wins over an earlier
    /// one with the same key. Inherited entries may not be UTF-8.
    pub env: Vec<(OsString, OsString)>,
    pub identity: Option<Identity>,
}

impl ProcessSpec {
    /// Value the child will see for `key`.
    pub fn env_os(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        let key = key.as_ref();
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Like [`ProcessSpec::env_os`], for values that are valid UTF-8.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env_os(key).and_then(OsStr::to_str)
    }

    /// Build a tokio [`Command`] with a clean environment, piped
    /// stdout/stderr and `kill_on_drop` set.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        if let Some(identity) = self.identity {
            if let Some(uid) = identity.uid {
                cmd.uid(uid);
            }
            if let Some(gid) = identity.gid {
                cmd.gid(gid);
            }
        }

        cmd
    }
}

/// Split a command declaration into program and arguments.
///
/// - One element: a space separated line, e.g. `["php worker.php"]`. It is
///   split on every single space.
/// - Two or more elements: already separated tokens, used verbatim. This is
///   how a program path containing spaces is passed.
pub fn parse_command(declaration: &[String]) -> Result<(String, Vec<String>)> {
    let mut tokens: Vec<String> = match declaration {
        [] => return Err(ServerError::validation("command must not be empty")),
        [line] => line.split(' ').map(str::to_string).collect(),
        many => many.to_vec(),
    };

    let program = tokens.remove(0);
    Ok((program, tokens))
}

/// Build the [`ProcessSpec`] for a command declaration.
///
/// The environment is assembled in this order, later entries winning:
/// 1. the prepared server environment,
/// 2. `env` as `UPPER(key)=interpolate(value)`,
/// 3. every variable from `lookup` (the inherited environment).
pub fn build_process_spec(
    declaration: &[String],
    prepared: &PreparedEnv,
    env: &BTreeMap<String, String>,
    lookup: &dyn EnvLookup,
    identity: Option<Identity>,
) -> Result<ProcessSpec> {
    let (program, args) = parse_command(declaration)?;

    let mut merged: Vec<(OsString, OsString)> =
        prepared.pairs().map(|(k, v)| (k.into(), v.into())).collect();

    merged.extend(
        env.iter()
            .map(|(k, v)| (k.to_uppercase().into(), interpolate(v, lookup).into())),
    );

    merged.extend(lookup.vars());

    Ok(ProcessSpec {
        program,
        args,
        env: merged,
        identity,
    })
}
