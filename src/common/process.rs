//! Supervised execution of external tools.
//!
//! Arguments are handed to the OS as a discrete list; nothing is ever passed
//! through a shell. Every run is bounded by a timeout and can be cancelled, and
//! the child is killed whenever its handle is dropped.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bytes of stderr kept from the end of the stream.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr_tail: String,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr_tail}")]
    Exited {
        program: String,
        status: ExitStatus,
        stderr_tail: String,
    },

    #[error("{program} timed out after {after:?}: {stderr_tail}")]
    TimedOut {
        program: String,
        after: Duration,
        stderr_tail: String,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Runs to completion, timeout or cancellation. A non-zero exit is an error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ToolOutput, ToolFailure> {
        let program = self.program_name();
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolFailure::Spawn {
                program: program.clone(),
                source,
            })?;

        debug!(program = %program, pid = ?child.id(), "spawned external tool");

        let stderr = child.stderr.take();
        let stderr_reader = tokio::spawn(async move {
            match stderr {
                Some(pipe) => read_tail(pipe, STDERR_TAIL_BYTES).await,
                None => String::new(),
            }
        });

        let outcome = tokio::select! {
            waited = child.wait() => Some(waited),
            _ = tokio::time::sleep(self.timeout) => None,
            _ = cancel.cancelled() => {
                warn!(program = %program, "cancelling external tool");
                let _ = child.kill().await;
                stderr_reader.abort();
                return Err(ToolFailure::Cancelled { program });
            }
        };

        let status = match outcome {
            Some(waited) => waited.map_err(|source| ToolFailure::Wait {
                program: program.clone(),
                source,
            })?,
            None => {
                warn!(program = %program, timeout = ?self.timeout, "external tool timed out, killing it");
                let _ = child.kill().await;
                let stderr_tail = collect_tail(stderr_reader).await;
                return Err(ToolFailure::TimedOut {
                    program,
                    after: self.timeout,
                    stderr_tail,
                });
            }
        };

        let stderr_tail = collect_tail(stderr_reader).await;
        let elapsed = started.elapsed();
        debug!(program = %program, %status, ?elapsed, "external tool exited");

        if !status.success() {
            return Err(ToolFailure::Exited {
                program,
                status,
                stderr_tail,
            });
        }

        Ok(ToolOutput {
            status,
            stderr_tail,
            elapsed,
        })
    }
}

/// A grandchild can keep the pipe open after the tool itself is gone, so the
/// reader only gets a short grace period.
async fn collect_tail(mut reader: JoinHandle<String>) -> String {
    match tokio::time::timeout(STDERR_DRAIN_GRACE, &mut reader).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            reader.abort();
            String::new()
        }
    }
}

/// Drains `reader`, keeping only the last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(limit);
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

/// Shortens `text` to at most `max_chars`, keeping the end (where encoders
/// print the actual error).
pub fn truncate_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[start..].to_string()
}
