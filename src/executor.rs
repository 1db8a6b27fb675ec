use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::languages::{Invocation, Language, Recipe};

/// Hard wall-clock deadline for every spawned process.
pub const EXECUTION_TIMEOUT: Duration = Duration::from_millis(5000);

const SCRATCH_ROOT: &str = "codecollab";

/// Body of `POST /execute`; a missing field yields a 400 from the route
/// handler instead of a deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub code: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds from request start, populated on every path.
    pub execution_time: u64,
}

impl ExecutionResult {
    fn failed(message: String, started: Instant) -> Self {
        ExecutionResult {
            output: String::new(),
            error: Some(message),
            execution_time: elapsed_ms(started),
        }
    }
}

/// Run a code snippet; every failure is normalized into the result's
/// `error` field, never raised to the caller.
pub async fn run(code: &str, language: &str) -> ExecutionResult {
    let started = Instant::now();

    let language = match language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => return ExecutionResult::failed(e.to_string(), started),
    };

    let workspace = match Workspace::create().await {
        Ok(workspace) => workspace,
        Err(e) => {
            return ExecutionResult::failed(format!("Failed to create workspace: {e}"), started)
        }
    };

    let result = execute_in(&workspace, code, language, started).await;
    workspace.remove().await;
    result
}

async fn execute_in(
    workspace: &Workspace,
    code: &str,
    language: Language,
    started: Instant,
) -> ExecutionResult {
    let source = workspace.dir.join(language.source_file());
    if let Err(e) = tokio::fs::write(&source, code).await {
        return ExecutionResult::failed(format!("Failed to write source file: {e}"), started);
    }

    match language.recipe(&workspace.dir) {
        Recipe::Informational(message) => ExecutionResult {
            output: message.to_string(),
            error: None,
            execution_time: elapsed_ms(started),
        },
        Recipe::Interpret(run) => finish(run_process(&run, &workspace.dir).await, started),
        Recipe::CompileThenRun { compile, run } => {
            match run_process(&compile, &workspace.dir).await {
                Ok(captured) if captured.success => {
                    finish(run_process(&run, &workspace.dir).await, started)
                }
                other => finish(other, started),
            }
        }
    }
}

#[derive(Debug)]
struct Captured {
    stdout: String,
    stderr: String,
    success: bool,
    timed_out: bool,
}

async fn run_process(invocation: &Invocation, dir: &Path) -> Result<Captured, String> {
    debug!("running {} {:?}", invocation.program, invocation.args);

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start `{}`: {e}", invocation.program))?;

    // Drain both pipes while waiting so a timed-out process still yields
    // whatever it wrote before the kill.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let wait = async {
        let drain_stdout = async {
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stdout_buf).await;
            }
        };
        let drain_stderr = async {
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stderr_buf).await;
            }
        };
        let (status, (), ()) = tokio::join!(child.wait(), drain_stdout, drain_stderr);
        status
    };

    match tokio::time::timeout(EXECUTION_TIMEOUT, wait).await {
        Ok(Ok(status)) => Ok(Captured {
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            success: status.success(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(format!("Failed to run `{}`: {e}", invocation.program)),
        Err(_) => {
            let _ = child.kill().await;
            Ok(Captured {
                stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                success: false,
                timed_out: true,
            })
        }
    }
}

fn finish(result: Result<Captured, String>, started: Instant) -> ExecutionResult {
    match result {
        Ok(captured) => {
            let error = if captured.timed_out {
                if captured.stderr.is_empty() {
                    Some(timeout_message())
                } else {
                    Some(captured.stderr)
                }
            } else if !captured.stderr.is_empty() {
                Some(captured.stderr)
            } else if captured.success {
                None
            } else {
                Some("Process exited with a non-zero status".to_string())
            };
            ExecutionResult {
                output: captured.stdout,
                error,
                execution_time: elapsed_ms(started),
            }
        }
        Err(message) => ExecutionResult::failed(message, started),
    }
}

fn timeout_message() -> String {
    format!(
        "Execution timed out after {} ms",
        EXECUTION_TIMEOUT.as_millis()
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// A scratch directory owned by exactly one execution request.
struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    async fn create() -> std::io::Result<Self> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir()
            .join(SCRATCH_ROOT)
            .join(format!("{stamp}-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Workspace { dir })
    }

    async fn remove(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            warn!("failed to remove scratch dir {}: {e}", self.dir.display());
        }
    }
}
