// src/server.rs

//! The object a host holds on to across the server lifecycle.
//!
//! It owns the validated configuration, the prepared environment and the
//! resolved process identity, and exposes the two hook points. The host is
//! expected to call [`Server::on_init`] before it builds its worker pool and
//! [`Server::after_init`] once the pool exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{HookConfig, ServerConfig, validate_config};
use crate::env::{EnvLookup, PreparedEnv, ProcessEnv, prepare_environment};
use crate::errors::Result;
use crate::exec::{
    HookContext, HookOutcome, HookPoint, Identity, OutputSink, ProcessSpec, TracingSink,
    build_process_spec, resolve_identity, run_hook,
};

pub struct Server {
    config: Arc<ServerConfig>,
    prepared_env: Arc<PreparedEnv>,
    identity: Option<Identity>,
    lookup: Arc<dyn EnvLookup>,
    sink: Option<Arc<dyn OutputSink>>,
}

impl Server {
    /// Validate `config` and prepare it against the process environment.
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_lookup(config, Arc::new(ProcessEnv))
    }

    /// Like [`Server::new`], reading variables from `lookup` instead.
    pub fn with_lookup(mut config: ServerConfig, lookup: Arc<dyn EnvLookup>) -> Result<Self> {
        validate_config(&mut config)?;
        let identity = resolve_identity(config.user.as_deref(), config.group.as_deref())?;
        let prepared_env = prepare_environment(&config.env, lookup.as_ref());

        debug!(
            relay = %config.relay,
            relay_timeout = ?config.relay_timeout,
            env = prepared_env.len(),
            "server configuration ready"
        );

        Ok(Self {
            config: Arc::new(config),
            prepared_env: Arc::new(prepared_env),
            identity,
            lookup,
            sink: None,
        })
    }

    /// Send hook output to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn prepared_env(&self) -> &PreparedEnv {
        &self.prepared_env
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    /// Replace the configuration. The prepared environment and identity are
    /// rebuilt; on error the current state is kept.
    pub fn reload(&mut self, mut config: ServerConfig) -> Result<()> {
        validate_config(&mut config)?;
        let identity = resolve_identity(config.user.as_deref(), config.group.as_deref())?;
        let prepared_env = prepare_environment(&config.env, self.lookup.as_ref());

        self.config = Arc::new(config);
        self.prepared_env = Arc::new(prepared_env);
        self.identity = identity;

        info!(env = self.prepared_env.len(), "server configuration reloaded");
        Ok(())
    }

    /// Run the `on_init` hook, if configured. Returns `Ok(None)` when it is not.
    pub async fn on_init(&self) -> Result<Option<HookOutcome>> {
        self.run_point(HookPoint::OnInit, self.config.on_init.as_ref()).await
    }

    /// Run the `after_init` hook, if configured.
    pub async fn after_init(&self) -> Result<Option<HookOutcome>> {
        self.run_point(HookPoint::AfterInit, self.config.after_init.as_ref()).await
    }

    /// Process description for one application worker.
    pub fn worker_process_spec(&self) -> Result<ProcessSpec> {
        build_process_spec(
            &self.config.command,
            &self.prepared_env,
            &BTreeMap::new(),
            self.lookup.as_ref(),
            self.identity,
        )
    }

    /// Process description for a hook, without starting it.
    pub fn hook_process_spec(&self, hook: &HookConfig) -> Result<ProcessSpec> {
        build_process_spec(
            &hook.command,
            &self.prepared_env,
            &hook.env,
            self.lookup.as_ref(),
            self.identity,
        )
    }

    async fn run_point(
        &self,
        point: HookPoint,
        hook: Option<&HookConfig>,
    ) -> Result<Option<HookOutcome>> {
        let Some(hook) = hook else {
            debug!(hook = %point, "no hook configured");
            return Ok(None);
        };

        let ctx = HookContext {
            prepared_env: Arc::clone(&self.prepared_env),
            lookup: Arc::clone(&self.lookup),
            identity: self.identity,
            sink: self
                .sink
                .clone()
                .unwrap_or_else(|| Arc::new(TracingSink::new(point.as_str())) as Arc<dyn OutputSink>),
        };

        let outcome = run_hook(point, hook, &ctx).await?;
        match outcome {
            HookOutcome::TimedOut { killed } => {
                warn!(hook = %point, killed, "hook timed out; continuing startup");
            }
            HookOutcome::Completed { exit_code, success } => {
                debug!(hook = %point, ?exit_code, success, "hook finished");
            }
        }
        Ok(Some(outcome))
    }
}
