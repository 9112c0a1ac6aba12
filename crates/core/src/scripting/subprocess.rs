//! Shared subprocess management.
//!
//! [`run_command`] spawns a prepared [`Command`], forwards every stdout and
//! stderr line to a [`ProcessOutput`] as soon as it arrives, and enforces
//! the timeout. Lines are decoded lossily so a stray non-UTF-8 byte never
//! stops log capture, and a line longer than [`MAX_LINE_BYTES`] is delivered
//! in chunks of at most that size.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use super::executor::{ScriptError, ScriptOutcome};
use crate::service_messages::output::ProcessOutput;

/// Longest line handed to the output sink (1 MiB).
///
/// A child that never writes a newline would otherwise be buffered whole.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Spawn `cmd`, stream its output into `output` and wait for it to exit.
///
/// On timeout or on a sink error the child is killed before returning.
pub async fn run_command<O: ProcessOutput + ?Sized>(
    cmd: &mut Command,
    timeout: Duration,
    output: &mut O,
) -> Result<ScriptOutcome, ScriptError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|source| ScriptError::Spawn { program, source })?;

    let result = tokio::time::timeout(timeout, pump(&mut child, output)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(status)) => Ok(ScriptOutcome {
            exit_code: status.code().unwrap_or(-1),
            duration_ms: elapsed_ms,
        }),
        Ok(Err(e)) => {
            kill(&mut child).await;
            Err(e)
        }
        Err(_elapsed) => {
            kill(&mut child).await;
            Err(ScriptError::Timeout { elapsed_ms })
        }
    }
}

/// Forward both streams until they close, then reap the child.
async fn pump<O: ProcessOutput + ?Sized>(
    child: &mut Child,
    output: &mut O,
) -> Result<ExitStatus, ScriptError> {
    let mut stdout = child.stdout.take().map(LineReader::new);
    let mut stderr = child.stderr.take().map(LineReader::new);

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line? {
                Some(line) => output.write_stdout(&line)?,
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line? {
                Some(line) => output.write_stderr(&line)?,
                None => stderr = None,
            },
        }
    }

    Ok(child.wait().await?)
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill child process");
    }
}

async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut Option<LineReader<R>>,
) -> std::io::Result<Option<String>> {
    match reader {
        Some(reader) => reader.next_line().await,
        None => Ok(None),
    }
}

/// Cancel-safe line reader: bytes from an interrupted read stay buffered
/// until the line completes.
struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let remaining = MAX_LINE_BYTES.saturating_sub(self.buf.len()) as u64;
        let read = (&mut self.inner)
            .take(remaining)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut line: &[u8] = &self.buf;
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        let decoded = String::from_utf8_lossy(line).into_owned();
        self.buf.clear();
        Ok(Some(decoded))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
