//! Child processes with a timeout and captured output.

use std::{io, process::Stdio, time::Duration};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
    task::JoinHandle,
};

/// Bytes of stdout/stderr kept per stream; the rest is dropped.
const OUTPUT_LIMIT: usize = 64 * 1024;

/// Captured result of a finished (or killed) child.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the child was killed or terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Last few lines of stderr, falling back to stdout, for error messages.
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let collected: Vec<&str> = source.trim_end().lines().collect();
        let start = collected.len().saturating_sub(lines);
        collected[start..].join("\n")
    }
}

/// Spawns `cmd` in its own process group, feeds it `stdin`, and waits up to
/// `timeout`.
///
/// When the timeout elapses the whole group is killed, so grandchildren
/// started through a shell die with it; that case is reported with
/// `timed_out` set rather than as an error. Spawn and pipe failures are
/// returned as `io::Error`.
pub async fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
) -> io::Result<ProcessOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.group_spawn()?;

    // Write stdin and drain both pipes concurrently so a chatty child cannot
    // deadlock on a full pipe while we are still writing.
    let writer = match (stdin, child.inner().stdin.take()) {
        (Some(input), Some(mut pipe)) => Some(tokio::spawn(async move {
            let result = pipe.write_all(&input).await;
            drop(pipe);
            result
        })),
        _ => None,
    };
    let stdout = drain(child.inner().stdout.take());
    let stderr = drain(child.inner().stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            kill_group(&mut child).await;
            stdout.abort();
            stderr.abort();
            log::warn!(
                "Process timed out after {}s, process group killed",
                timeout.as_secs()
            );
            return Ok(ProcessOutput {
                timed_out: true,
                ..ProcessOutput::default()
            });
        }
    };

    if let Some(writer) = writer {
        match writer.await {
            Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
            Err(e) => return Err(io::Error::other(e)),
            _ => {}
        }
    }

    Ok(ProcessOutput {
        exit_code: status.code(),
        success: status.success(),
        stdout: bounded(&collect(stdout).await?),
        stderr: bounded(&collect(stderr).await?),
        timed_out: false,
    })
}

async fn kill_group(child: &mut AsyncGroupChild) {
    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill process group: {e}");
        return;
    }
    // Reap the leader so no zombie is left behind
    if let Err(e) = child.wait().await {
        log::debug!("Failed to reap killed process: {e}");
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    reader.await.map_err(io::Error::other)?
}

fn bounded(bytes: &[u8]) -> String {
    if bytes.len() <= OUTPUT_LIMIT {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..OUTPUT_LIMIT]).into_owned();
    text.push_str(&format!(
        "\n[output truncated {} bytes]\n",
        bytes.len() - OUTPUT_LIMIT
    ));
    text
}
