// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] parses command declarations and builds [`ProcessSpec`]s.
//! - [`identity`] resolves `user` / `group` to numeric ids.
//! - [`sink`] is where hook output ends up.
//! - [`runner`] starts a hook, races it against its `exec_timeout` and kills
//!   it if needed.

pub mod command;
pub mod identity;
pub mod runner;
pub mod sink;

pub use command::{ProcessSpec, build_process_spec, parse_command};
pub use identity::{Identity, resolve_identity};
pub use runner::{HookContext, HookOutcome, HookPoint, run_hook};
pub use sink::{OutputSink, SinkWriter, TracingSink};
