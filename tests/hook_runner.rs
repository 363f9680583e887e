#![cfg(unix)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use srvhooks::env::{EnvLookup, PreparedEnv, ProcessEnv};
use srvhooks::errors::ServerError;
use srvhooks::exec::{HookContext, HookOutcome, HookPoint, run_hook};
use srvhooks_test_utils::builders::HookConfigBuilder;
use srvhooks_test_utils::sink::CollectingSink;
use srvhooks_test_utils::{init_tracing, process_env_map, with_timeout};

fn context(lookup: Arc<dyn EnvLookup>, sink: &CollectingSink) -> HookContext {
    HookContext {
        prepared_env: Arc::new(PreparedEnv::default()),
        lookup,
        identity: None,
        sink: Arc::new(sink.clone()),
    }
}

#[tokio::test]
async fn completed_hook_forwards_stdout_and_stderr() {
    init_tracing();
    let sink = CollectingSink::new();
    let hook = HookConfigBuilder::from_parts(&["sh", "-c", "echo hello; echo oops >&2"])
        .timeout(Duration::from_secs(5))
        .build();

    let outcome = with_timeout(run_hook(
        HookPoint::OnInit,
        &hook,
        &context(Arc::new(ProcessEnv), &sink),
    ))
    .await
    .unwrap();

    assert_eq!(
        outcome,
        HookOutcome::Completed {
            exit_code: Some(0),
            success: true
        }
    );

    let mut lines = sink.lines();
    lines.sort();
    assert_eq!(lines, vec!["hello".to_string(), "oops".to_string()]);
}

#[tokio::test]
async fn non_zero_exit_is_not_an_error() {
    init_tracing();
    let sink = CollectingSink::new();
    let hook = HookConfigBuilder::from_parts(&["sh", "-c", "exit 3"])
        .timeout(Duration::from_secs(5))
        .build();

    let outcome = with_timeout(run_hook(
        HookPoint::AfterInit,
        &hook,
        &context(Arc::new(ProcessEnv), &sink),
    ))
    .await
    .unwrap();

    assert_eq!(
        outcome,
        HookOutcome::Completed {
            exit_code: Some(3),
            success: false
        }
    );
}

#[tokio::test]
async fn slow_hook_is_killed_and_still_succeeds() {
    init_tracing();
    let sink = CollectingSink::new();
    let hook = HookConfigBuilder::new("sleep 30")
        .timeout(Duration::from_secs(1))
        .build();

    let started = Instant::now();
    let outcome = with_timeout(run_hook(
        HookPoint::OnInit,
        &hook,
        &context(Arc::new(ProcessEnv), &sink),
    ))
    .await
    .unwrap();

    assert_eq!(outcome, HookOutcome::TimedOut { killed: true });
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn missing_program_is_a_start_error() {
    init_tracing();
    let sink = CollectingSink::new();
    let hook = HookConfigBuilder::new("/nonexistent/srvhooks-test-binary --flag")
        .timeout(Duration::from_secs(5))
        .build();

    let result = run_hook(
        HookPoint::OnInit,
        &hook,
        &context(Arc::new(ProcessEnv), &sink),
    )
    .await;

    match result {
        Err(ServerError::Start { hook, program, .. }) => {
            assert_eq!(hook, "on_init");
            assert_eq!(program, "/nonexistent/srvhooks-test-binary");
        }
        other => panic!("expected Start error, got {other:?}"),
    }
}

#[tokio::test]
async fn hook_env_is_interpolated_and_uppercased() {
    init_tracing();
    let sink = CollectingSink::new();

    let mut lookup: BTreeMap<String, String> = process_env_map();
    lookup.insert("SRVHOOKS_TEST_NAME".to_string(), "there".to_string());

    let hook = HookConfigBuilder::from_parts(&["sh", "-c", "echo \"$GREETING\""])
        .env("greeting", "hi ${SRVHOOKS_TEST_NAME}$SRVHOOKS_TEST_MISSING")
        .timeout(Duration::from_secs(5))
        .build();

    with_timeout(run_hook(
        HookPoint::OnInit,
        &hook,
        &context(Arc::new(lookup), &sink),
    ))
    .await
    .unwrap();

    assert_eq!(sink.lines(), vec!["hi there".to_string()]);
}
