#![cfg(unix)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use srvhooks::env::EnvLookup;
use srvhooks::errors::ServerError;
use srvhooks::exec::HookOutcome;
use srvhooks::server::Server;
use srvhooks_test_utils::builders::{HookConfigBuilder, ServerConfigBuilder};
use srvhooks_test_utils::sink::CollectingSink;
use srvhooks_test_utils::{init_tracing, process_env_map, with_timeout};

fn lookup_with(extra: &[(&str, &str)]) -> Arc<dyn EnvLookup> {
    let mut env: BTreeMap<String, String> = process_env_map();
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    Arc::new(env)
}

#[tokio::test]
async fn hooks_run_in_lifecycle_order_with_server_env() {
    init_tracing();
    let sink = CollectingSink::new();

    let cfg = ServerConfigBuilder::new("php worker.php")
        .env("app_dsn", "db://$SRVHOOKS_DB_HOST")
        .on_init(HookConfigBuilder::from_parts(&["sh", "-c", "echo init $APP_DSN"]).build())
        .after_init(
            HookConfigBuilder::from_parts(&["sh", "-c", "echo after $STAGE"])
                .env("stage", "warm")
                .build(),
        )
        .build();

    let server = Server::with_lookup(cfg, lookup_with(&[("SRVHOOKS_DB_HOST", "db1")]))
        .unwrap()
        .with_sink(Arc::new(sink.clone()));

    let first = with_timeout(server.on_init()).await.unwrap();
    let second = with_timeout(server.after_init()).await.unwrap();

    let done = Some(HookOutcome::Completed {
        exit_code: Some(0),
        success: true,
    });
    assert_eq!(first, done);
    assert_eq!(second, done);
    assert_eq!(
        sink.lines(),
        vec!["init db://db1".to_string(), "after warm".to_string()]
    );
}

#[tokio::test]
async fn absent_hooks_are_skipped() {
    let server = Server::new(ServerConfigBuilder::new("php worker.php").build()).unwrap();
    assert_eq!(server.on_init().await.unwrap(), None);
    assert_eq!(server.after_init().await.unwrap(), None);
}

#[tokio::test]
async fn timed_out_hook_does_not_block_startup() {
    init_tracing();
    let cfg = ServerConfigBuilder::new("php worker.php")
        .on_init(
            HookConfigBuilder::new("sleep 30")
                .timeout(Duration::from_secs(1))
                .build(),
        )
        .build();

    let server = Server::new(cfg).unwrap();
    let outcome = with_timeout(server.on_init()).await.unwrap();
    assert_eq!(outcome, Some(HookOutcome::TimedOut { killed: true }));
}

#[test]
fn validation_defaults_hook_timeouts() {
    let cfg = ServerConfigBuilder::new("php worker.php")
        .on_init(HookConfigBuilder::new("echo on").build())
        .after_init(HookConfigBuilder::new("echo after").build())
        .build();

    let server = Server::new(cfg).unwrap();
    let cfg = server.config();
    assert_eq!(cfg.on_init.as_ref().unwrap().exec_timeout, Duration::from_secs(60));
    assert_eq!(cfg.after_init.as_ref().unwrap().exec_timeout, Duration::from_secs(60));
    assert_eq!(cfg.relay, "pipes");
}

#[test]
fn empty_hook_command_prevents_startup() {
    let cfg = ServerConfigBuilder::new("php worker.php")
        .after_init(HookConfigBuilder::from_parts(&[]).build())
        .build();

    match Server::new(cfg) {
        Err(ServerError::Validation(msg)) => assert!(msg.contains("after_init")),
        Err(e) => panic!("expected Validation error, got {e:?}"),
        Ok(_) => panic!("expected error, got Ok"),
    }
}

#[test]
fn unknown_user_prevents_startup() {
    let cfg = ServerConfigBuilder::new("php foo/bar")
        .user("srvhooks-no-such-user")
        .build();

    match Server::new(cfg) {
        Err(ServerError::IdentityResolution { field, name, .. }) => {
            assert_eq!(field, "user");
            assert_eq!(name, "srvhooks-no-such-user");
        }
        Err(e) => panic!("expected IdentityResolution error, got {e:?}"),
        Ok(_) => panic!("expected error, got Ok"),
    }
}

#[test]
fn worker_spec_carries_prepared_env() {
    let cfg = ServerConfigBuilder::new("php foo bar")
        .env("database_url", "mysql://${SRVHOOKS_DB_USER}@host")
        .build();

    let server = Server::with_lookup(cfg, lookup_with(&[("SRVHOOKS_DB_USER", "foo")])).unwrap();
    let spec = server.worker_process_spec().unwrap();

    assert_eq!(spec.program, "php");
    assert_eq!(spec.args, vec!["foo".to_string(), "bar".to_string()]);
    assert_eq!(spec.env_value("DATABASE_URL"), Some("mysql://foo@host"));
}

#[test]
fn reload_rebuilds_prepared_env() {
    let lookup = lookup_with(&[("SRVHOOKS_RELOAD", "x")]);
    let mut server = Server::with_lookup(
        ServerConfigBuilder::new("php").env("a", "1").build(),
        Arc::clone(&lookup),
    )
    .unwrap();
    assert!(server.prepared_env().contains("A=1"));

    server
        .reload(ServerConfigBuilder::new("php").env("b", "$SRVHOOKS_RELOAD").build())
        .unwrap();
    assert!(!server.prepared_env().contains("A=1"));
    assert!(server.prepared_env().contains("B=x"));

    // A rejected reload keeps the previous state.
    assert!(server.reload(ServerConfigBuilder::new("").build()).is_err());
    assert!(server.prepared_env().contains("B=x"));
}
