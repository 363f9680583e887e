// src/exec/runner.rs

//! Running a single `on_init` / `after_init` command with a time limit.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::HookConfig;
use crate::env::{EnvLookup, PreparedEnv};
use crate::errors::{Result, ServerError};
use crate::exec::command::build_process_spec;
use crate::exec::identity::Identity;
use crate::exec::sink::{OutputSink, SinkWriter};

/// Lifecycle point a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before the worker pool is constructed.
    OnInit,
    /// After the worker pool is constructed.
    AfterInit,
}

impl HookPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::OnInit => "on_init",
            HookPoint::AfterInit => "after_init",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a started hook ended.
///
/// Both variants are a successful [`run_hook`] from the caller's point of
/// view; the distinction is for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The process exited on its own. `exit_code` is `None` when it was
    /// terminated by a signal or the wait itself failed.
    Completed { exit_code: Option<i32>, success: bool },
    /// The time limit elapsed first. `killed` is false if the kill failed.
    TimedOut { killed: bool },
}

/// Everything a hook needs besides its own config.
#[derive(Clone)]
pub struct HookContext {
    pub prepared_env: Arc<PreparedEnv>,
    pub lookup: Arc<dyn EnvLookup>,
    pub identity: Option<Identity>,
    pub sink: Arc<dyn OutputSink>,
}

/// Longest chunk forwarded as one write; longer lines are split.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// How long output pumps may keep draining after the hook has ended.
const PUMP_GRACE: Duration = Duration::from_millis(200);

/// What the waiter task reports back.
enum WaitResult {
    Exited(std::io::Result<std::process::ExitStatus>),
    Killed(std::io::Result<()>),
}

/// Run `hook` once and wait for it to finish or time out.
///
/// The only error is failing to build or launch the process. Once it runs,
/// a non-zero exit, a wait failure, a timeout or a failed kill are logged and
/// reported through the returned [`HookOutcome`].
pub async fn run_hook(point: HookPoint, hook: &HookConfig, ctx: &HookContext) -> Result<HookOutcome> {
    let spec = build_process_spec(
        &hook.command,
        &ctx.prepared_env,
        &hook.env,
        ctx.lookup.as_ref(),
        ctx.identity,
    )?;

    info!(
        hook = %point,
        program = %spec.program,
        args = ?spec.args,
        timeout = ?hook.exec_timeout,
        "starting hook process"
    );

    let mut child = spec.to_command().spawn().map_err(|source| ServerError::Start {
        hook: point.to_string(),
        program: spec.program.clone(),
        source,
    })?;

    let pumps = [
        child.stdout.take().map(|out| spawn_output_pump(out, ctx.sink.clone())),
        child.stderr.take().map(|err| spawn_output_pump(err, ctx.sink.clone())),
    ];

    let (kill_tx, kill_rx) = oneshot::channel();
    let mut waiter = tokio::spawn(wait_or_kill(child, kill_rx));

    let outcome = tokio::select! {
        res = &mut waiter => completed(point, res),
        _ = tokio::time::sleep(hook.exec_timeout) => {
            timed_out(point, hook.exec_timeout, kill_tx, waiter).await
        }
    };

    drain_pumps(pumps.into_iter().flatten(), PUMP_GRACE).await;

    Ok(outcome)
}

/// Give each pump `grace` to reach end of output, then stop it.
///
/// Grandchildren of a hook can keep its pipes open, so a pump may never see
/// end of output on its own.
async fn drain_pumps(pumps: impl IntoIterator<Item = JoinHandle<()>>, grace: Duration) {
    for mut pump in pumps {
        if tokio::time::timeout(grace, &mut pump).await.is_err() {
            pump.abort();
        }
    }
}

async fn wait_or_kill(mut child: Child, kill_rx: oneshot::Receiver<()>) -> WaitResult {
    tokio::select! {
        status = child.wait() => WaitResult::Exited(status),
        Ok(()) = kill_rx => WaitResult::Killed(child.kill().await),
    }
}

fn completed(
    point: HookPoint,
    res: std::result::Result<WaitResult, tokio::task::JoinError>,
) -> HookOutcome {
    match res {
        Ok(WaitResult::Exited(Ok(status))) => {
            let outcome = HookOutcome::Completed {
                exit_code: status.code(),
                success: status.success(),
            };
            if status.success() {
                info!(hook = %point, exit_code = ?status.code(), "hook process exited");
            } else {
                warn!(hook = %point, exit_code = ?status.code(), "hook process exited with failure");
            }
            outcome
        }
        Ok(WaitResult::Exited(Err(e))) => {
            error!(hook = %point, error = %e, "process wait");
            HookOutcome::Completed { exit_code: None, success: false }
        }
        // The kill channel is only used after the timer fired.
        Ok(WaitResult::Killed(_)) => HookOutcome::TimedOut { killed: true },
        Err(e) => {
            error!(hook = %point, error = %e, "hook waiter task failed");
            HookOutcome::Completed { exit_code: None, success: false }
        }
    }
}

async fn timed_out(
    point: HookPoint,
    limit: Duration,
    kill_tx: oneshot::Sender<()>,
    waiter: JoinHandle<WaitResult>,
) -> HookOutcome {
    warn!(hook = %point, timeout = ?limit, "hook exceeded exec_timeout; killing process");

    // If the waiter already finished the receiver is gone; the process has
    // exited in the meantime and there is nothing to kill.
    let _ = kill_tx.send(());

    match waiter.await {
        Ok(WaitResult::Killed(Ok(()))) => HookOutcome::TimedOut { killed: true },
        Ok(WaitResult::Killed(Err(e))) => {
            error!(hook = %point, error = %e, "process killed");
            HookOutcome::TimedOut { killed: false }
        }
        Ok(WaitResult::Exited(status)) => {
            info!(hook = %point, status = ?status, "hook process exited while timing out");
            HookOutcome::TimedOut { killed: false }
        }
        Err(e) => {
            error!(hook = %point, error = %e, "hook waiter task failed");
            HookOutcome::TimedOut { killed: false }
        }
    }
}

/// Forward a child's output to `sink`, one line per write.
///
/// Lines longer than [`MAX_LINE_BYTES`] are forwarded in pieces of at most
/// that size.
fn spawn_output_pump<R>(stream: R, sink: Arc<dyn OutputSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut writer = SinkWriter::new(sink);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let mut line = (&mut reader).take(MAX_LINE_BYTES as u64);
            match line.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let _ = writer.write_all(&buf);
                }
                Err(e) => {
                    warn!(error = %e, "reading hook output failed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::AsyncWriteExt;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl OutputSink for Collect {
        fn write_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    impl Collect {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn hook_point_names() {
        assert_eq!(HookPoint::OnInit.to_string(), "on_init");
        assert_eq!(HookPoint::AfterInit.as_str(), "after_init");
    }

    #[tokio::test]
    async fn long_lines_are_forwarded_in_bounded_pieces() {
        let sink = Arc::new(Collect::default());
        let mut output = vec![b'x'; MAX_LINE_BYTES * 2 + 10];
        output.extend_from_slice(b"\nshort\n");

        spawn_output_pump(std::io::Cursor::new(output), sink.clone())
            .await
            .unwrap();

        let lines = sink.lines();
        let lengths: Vec<usize> = lines.iter().map(String::len).collect();
        assert_eq!(lengths, vec![MAX_LINE_BYTES, MAX_LINE_BYTES, 10, 5]);
        assert_eq!(lines[3], "short");
    }

    #[tokio::test]
    async fn pumps_still_open_after_grace_are_stopped() {
        let sink = Arc::new(Collect::default());
        let (reader, mut writer) = tokio::io::duplex(1024);
        let pump = spawn_output_pump(reader, sink.clone());

        writer.write_all(b"early\n").await.unwrap();
        drain_pumps([pump], Duration::from_millis(50)).await;

        // The write end is still open, as if a grandchild held the pipe.
        // Once the pump is gone the write may fail with a broken pipe.
        let _ = writer.write_all(b"late\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.lines(), vec!["early".to_string()]);
    }
}
