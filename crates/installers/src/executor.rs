//! Command execution against the host.
//!
//! Commands are always an argument vector, never a shell string. The program name is
//! resolved against `PATH` and then a fixed list of system directories, since services
//! started by init systems often run with a truncated `PATH`.
//!
//! A failing command is a normal result (`success == false`), not an error: callers decide
//! what a non-zero exit means for them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::metrics::COMMAND_FAILURES_TOTAL;

/// Exit code reported when a command exceeds its timeout (negated `ETIMEDOUT`).
pub const TIMEOUT_EXIT_CODE: i32 = -110;
/// Exit code reported when the program could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

pub const FALLBACK_SEARCH_DIRS: &[&str] = &["/usr/bin", "/bin", "/usr/sbin", "/sbin", "/usr/local/bin"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { success: true, stdout: stdout.into(), stderr: String::new(), exit_code: Some(0) }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.into(), exit_code: Some(exit_code) }
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == Some(TIMEOUT_EXIT_CODE)
    }

    /// Trimmed stdout, falling back to stderr; several daemons print `--version` on stderr.
    pub fn text(&self) -> String {
        let out = self.stdout.trim();
        if out.is_empty() { self.stderr.trim().to_string() } else { out.to_string() }
    }
}

/// The only seam through which installers touch the host.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `argv` to completion. `None` uses the executor's default timeout.
    async fn run(&self, argv: &[&str], timeout: Option<Duration>) -> CommandOutput;

    /// Resolved location of `program`, if it can be found.
    async fn which(&self, program: &str) -> Option<PathBuf>;

    async fn read_file(&self, path: &Path) -> std::io::Result<String>;

    /// Create or overwrite `path` with `contents`.
    async fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()>;

    async fn path_exists(&self, path: &Path) -> bool;

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Executor type name (for logs)
    fn name(&self) -> &str;
}

/// Runs commands on the local machine through `tokio::process`.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    default_timeout: Duration,
}

impl SystemExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        resolve_program(program, std::env::var_os("PATH"))
    }
}

fn resolve_program(program: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let mut dirs: Vec<PathBuf> = path_var.map(|v| std::env::split_paths(&v).collect()).unwrap_or_default();
    dirs.extend(FALLBACK_SEARCH_DIRS.iter().map(PathBuf::from));
    dirs.into_iter().find_map(|dir| candidate(&dir, program))
}

#[cfg(unix)]
fn candidate(dir: &Path, program: &str) -> Option<PathBuf> {
    let path = dir.join(program);
    is_executable(&path).then_some(path)
}

#[cfg(not(unix))]
fn candidate(dir: &Path, program: &str) -> Option<PathBuf> {
    let path = dir.join(program);
    if is_executable(&path) {
        return Some(path);
    }
    let exe = path.with_extension("exe");
    is_executable(&exe).then_some(exe)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn run(&self, argv: &[&str], timeout: Option<Duration>) -> CommandOutput {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutput::failed(SPAWN_FAILURE_EXIT_CODE, "empty command");
        };
        let command_line = argv.join(" ");
        // unresolvable names pass through so the spawn error is what gets reported
        let resolved = self.resolve(program).unwrap_or_else(|| PathBuf::from(program));
        let limit = timeout.unwrap_or(self.default_timeout);

        let spawned = Command::new(&resolved)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let out = match spawned {
            Err(e) => CommandOutput::failed(SPAWN_FAILURE_EXIT_CODE, format!("failed to spawn {program}: {e}")),
            // dropping the timed-out future drops the child, which kills it
            Ok(child) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(Ok(output)) => CommandOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                },
                Ok(Err(e)) => CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("failed to wait for {program}: {e}"),
                    exit_code: None,
                },
                Err(_) => CommandOutput::failed(
                    TIMEOUT_EXIT_CODE,
                    format!("{program} timed out after {}s", limit.as_secs()),
                ),
            },
        };

        if out.success {
            debug!(command = %command_line, exit_code = ?out.exit_code, "command_ok");
        } else {
            COMMAND_FAILURES_TOTAL.inc();
            warn!(command = %command_line, exit_code = ?out.exit_code, stderr = %out.stderr.trim(), "command_failed");
        }
        out
    }

    async fn which(&self, program: &str) -> Option<PathBuf> {
        self.resolve(program)
    }

    async fn read_file(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        tokio::fs::write(path, contents).await?;
        debug!(path = %path.display(), bytes = contents.len(), "file_written");
        Ok(())
    }

    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    fn name(&self) -> &str {
        "SystemExecutor"
    }
}
