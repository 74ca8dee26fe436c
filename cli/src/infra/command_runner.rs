//! Local process execution with a hard deadline.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Runs local programs, killing them when the deadline passes.
///
/// `tokio::time::timeout` around `.output()` would drop the future but leave
/// the child running, so the deadline is raced with `select!` and the child
/// is killed explicitly.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` with `args`, capturing both output streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or does not finish
    /// within the deadline.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    drain(stdout_handle.as_mut()),
                    drain(stderr_handle.as_mut()),
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", self.timeout.as_secs())
            }
        }
    }
}

async fn drain<R: AsyncReadExt + Unpin>(handle: Option<&mut R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}
