//! External import command execution.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{ExportError, Result};
use crate::template::TemplateEngine;

/// How long output is still collected once the shell has exited.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Result of running an import command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Rendered command line.
    pub command: String,
    /// Exit code; `None` if killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs `import_cmd` templates through a shell.
pub struct ImportCommand {
    shell: String,
    timeout: Option<Duration>,
    template_engine: TemplateEngine,
}

impl ImportCommand {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout: None,
            template_engine: TemplateEngine::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Render the command with `outfile` and run it.
    ///
    /// A non-zero exit status is reported in the outcome, not as an error.
    pub async fn run(&self, command_template: &str, outfile: &Path) -> Result<ImportOutcome> {
        let command = self
            .template_engine
            .render_import_command(command_template, outfile)?;
        self.execute(command).await
    }

    async fn execute(&self, command: String) -> Result<ImportOutcome> {
        let start = Instant::now();

        tracing::info!(command = %command, "Running import command");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::Import(format!("failed to spawn '{}': {}", command, e)))?;

        let (stdout_handle, stdout) = capture(child.stdout.take(), "stdout");
        let (stderr_handle, stderr) = capture(child.stderr.take(), "stderr");

        let (exit_code, timed_out) = match self.timeout {
            Some(duration) => match timeout(duration, child.wait()).await {
                Ok(status) => (wait_code(status)?, false),
                Err(_) => {
                    let _ = child.kill().await;
                    (None, true)
                }
            },
            None => (wait_code(child.wait().await)?, false),
        };

        // Background children of the shell may keep the pipes open after it exits.
        let grace = if timed_out { Duration::ZERO } else { OUTPUT_GRACE };
        let stdout = drain(stdout_handle, stdout, grace).await;
        let stderr = drain(stderr_handle, stderr, grace).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = ImportOutcome {
            command,
            exit_code,
            stdout,
            stderr,
            timed_out,
            duration_ms,
        };

        if outcome.is_success() {
            tracing::info!(duration_ms, "Import command finished");
        } else if outcome.timed_out {
            tracing::warn!(command = %outcome.command, duration_ms, "Import command timed out");
        } else {
            tracing::warn!(
                command = %outcome.command,
                exit_code = ?outcome.exit_code,
                stderr = %outcome.stderr.trim_end(),
                "Import command failed"
            );
        }

        Ok(outcome)
    }
}

/// Read a pipe line by line into a shared buffer.
fn capture<R>(pipe: Option<R>, stream: &'static str) -> (JoinHandle<()>, Arc<Mutex<String>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let output = Arc::new(Mutex::new(String::new()));
    let sink = output.clone();
    let handle = tokio::spawn(async move {
        if let Some(pipe) = pipe {
            let mut reader = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                tracing::debug!(stream, "{}", line);
                if let Ok(mut out) = sink.lock() {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
    });
    (handle, output)
}

/// Wait up to `grace` for a reader to hit EOF, then detach it and keep what it read.
async fn drain(mut handle: JoinHandle<()>, output: Arc<Mutex<String>>, grace: Duration) -> String {
    if timeout(grace, &mut handle).await.is_err() {
        tracing::debug!("Import output pipe still open after the command ended");
        handle.abort();
    }
    output
        .lock()
        .map(|mut out| std::mem::take(&mut *out))
        .unwrap_or_default()
}

fn wait_code(status: std::io::Result<std::process::ExitStatus>) -> Result<Option<i32>> {
    let status = status
        .map_err(|e| ExportError::Import(format!("failed to wait for import command: {}", e)))?;
    Ok(status.code())
}

impl Default for ImportCommand {
    fn default() -> Self {
        Self::new()
    }
}
