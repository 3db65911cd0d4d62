use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use weft_core::config::SandboxConfig;
use weft_core::security::{self, DangerousPatternMatcher};

/// Exit code reported when a command exceeds its wall-clock timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Limits for one sandboxed run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub working_dir: PathBuf,
}

impl RunOptions {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_bytes: config.max_output_bytes,
            working_dir: config.working_dir.clone(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

/// Outcome of a sandboxed run. Policy rejections are reported here, never
/// as errors, so a calling tool node can surface them as ordinary output.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl RunResult {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: 1,
            success: false,
        }
    }
}

/// Validates and runs a single restricted shell command.
pub struct CommandSandbox {
    matcher: DangerousPatternMatcher,
}

impl CommandSandbox {
    pub fn new() -> Self {
        Self {
            matcher: DangerousPatternMatcher::default(),
        }
    }

    /// Run one command under the sandbox policy.
    ///
    /// Validation order: dangerous patterns, program whitelist, path
    /// confinement. A rejected command never spawns a process.
    pub async fn run(&self, command: &str, opts: &RunOptions) -> RunResult {
        if let Some(label) = self.matcher.is_dangerous(command) {
            debug!(command, label, "Sandbox rejected dangerous command");
            return RunResult::rejected(format!(
                "Command rejected: matches dangerous pattern ({})",
                label
            ));
        }

        let Some(program) = command.split_whitespace().next() else {
            return RunResult::rejected("Command rejected: empty command");
        };
        if !security::is_whitelisted(program) {
            debug!(command, program, "Sandbox rejected non-whitelisted program");
            return RunResult::rejected(format!(
                "Command rejected: '{}' is not a whitelisted program",
                program
            ));
        }

        if let Some(reason) = security::validate_paths(command, &opts.working_dir) {
            debug!(command, reason, "Sandbox rejected path escape");
            return RunResult::rejected(format!("Command rejected: {}", reason));
        }

        self.spawn(command, opts).await
    }

    async fn spawn(&self, command: &str, opts: &RunOptions) -> RunResult {
        let mut cmd = shell_command(command);
        cmd.current_dir(&opts.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env_clear();
        // Minimal environment: just enough for the whitelisted programs.
        for key in ["PATH", "HOME", "USER"] {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "Sandbox spawn failed");
                return RunResult::rejected(format!("Failed to spawn command: {}", e));
            }
        };

        let cap = opts.max_output_bytes;
        let work = async {
            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();
            let mut out_buf: Vec<u8> = Vec::new();
            let mut err_buf: Vec<u8> = Vec::new();
            let mut out_chunk = [0u8; 4096];
            let mut err_chunk = [0u8; 4096];
            let mut out_done = stdout.is_none();
            let mut err_done = stderr.is_none();
            let mut truncated = false;

            while !(out_done && err_done) {
                tokio::select! {
                    read = read_some(&mut stdout, &mut out_chunk), if !out_done => {
                        match read {
                            Some(bytes) => {
                                out_buf.extend_from_slice(bytes_slice(&out_chunk, bytes));
                                if out_buf.len() > cap {
                                    truncated = true;
                                    break;
                                }
                            }
                            None => out_done = true,
                        }
                    }
                    read = read_some(&mut stderr, &mut err_chunk), if !err_done => {
                        match read {
                            Some(bytes) => {
                                err_buf.extend_from_slice(bytes_slice(&err_chunk, bytes));
                                if err_buf.len() > cap {
                                    truncated = true;
                                    break;
                                }
                            }
                            None => err_done = true,
                        }
                    }
                }
            }

            if truncated {
                // Output cap exceeded: terminate the process early.
                let _ = child.kill().await;
            }

            let status = child.wait().await;
            (out_buf, err_buf, truncated, status)
        };

        match tokio::time::timeout(opts.timeout, work).await {
            Ok((out_buf, err_buf, truncated, status)) => {
                let mut stderr = String::from_utf8_lossy(&err_buf).into_owned();
                if truncated {
                    stderr.push_str("\n(output truncated: exceeded size limit)");
                }
                let exit_code = match status {
                    Ok(status) => status.code().unwrap_or(-1),
                    Err(e) => {
                        warn!(command, error = %e, "Sandbox wait failed");
                        -1
                    }
                };
                let success = exit_code == 0 && !truncated;
                RunResult {
                    stdout: String::from_utf8_lossy(&out_buf).into_owned(),
                    stderr,
                    exit_code,
                    success,
                }
            }
            // Timeout: the dropped future kills the child (kill_on_drop).
            Err(_) => RunResult {
                stdout: String::new(),
                stderr: format!(
                    "Command timed out after {} seconds",
                    opts.timeout.as_secs()
                ),
                exit_code: TIMEOUT_EXIT_CODE,
                success: false,
            },
        }
    }
}

impl Default for CommandSandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a chunk from an optional stream; `None` means EOF or read error.
async fn read_some<R: AsyncReadExt + Unpin>(
    stream: &mut Option<R>,
    chunk: &mut [u8],
) -> Option<usize> {
    match stream {
        Some(r) => match r.read(chunk).await {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(n),
        },
        None => None,
    }
}

fn bytes_slice(chunk: &[u8], len: usize) -> &[u8] {
    &chunk[..len.min(chunk.len())]
}

#[cfg(target_os = "windows")]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}
