// src/lib.rs

pub mod cli;
pub mod config;
pub mod env;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod server;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::CliArgs;
use crate::config::{HookConfig, load_from_path};
use crate::server::Server;

pub use crate::errors::ServerError;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (validation happens in [`Server::new`])
/// - environment preparation and identity resolution
/// - the `on_init` hook, then the `after_init` hook
///
/// The worker pool itself belongs to the host application; the point
/// between the two hooks is where it would be built.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_from_path(&args.config)
        .with_context(|| format!("loading config from {:?}", args.config))?;

    let server = Server::new(cfg).context("invalid configuration")?;

    if args.dry_run {
        print_dry_run(&server)?;
        return Ok(());
    }

    server.on_init().await?;
    info!(
        command = ?server.config().command,
        relay = %server.config().relay,
        "worker pool may be constructed"
    );
    server.after_init().await?;

    Ok(())
}

/// Print what would be run, without spawning anything.
fn print_dry_run(server: &Server) -> Result<()> {
    let cfg = server.config();

    println!("srvhooks dry-run");
    println!("  relay = {}", cfg.relay);
    println!("  relay_timeout = {:?}", cfg.relay_timeout);
    if let Some(identity) = server.identity() {
        println!("  uid = {:?}, gid = {:?}", identity.uid, identity.gid);
    }
    println!();

    println!("prepared env ({}):", server.prepared_env().len());
    for entry in server.prepared_env().entries() {
        println!("  {entry}");
    }
    println!();

    let worker = server.worker_process_spec()?;
    println!("worker: {} {:?}", worker.program, worker.args);

    print_hook(server, "on_init", cfg.on_init.as_ref())?;
    print_hook(server, "after_init", cfg.after_init.as_ref())?;
    Ok(())
}

fn print_hook(server: &Server, name: &str, hook: Option<&HookConfig>) -> Result<()> {
    let Some(hook) = hook else {
        return Ok(());
    };
    let spec = server.hook_process_spec(hook)?;
    println!("{name}: {} {:?}", spec.program, spec.args);
    println!("    exec_timeout: {:?}", hook.exec_timeout);
    for key in hook.env.keys() {
        let key = key.to_uppercase();
        println!("    {key}={}", spec.env_value(&key).unwrap_or_default());
    }
    Ok(())
}
