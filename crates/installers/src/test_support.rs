//! Scripted executor: records every command, answers from a response table and keeps
//! files in memory, so installers can be exercised without touching the host.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use configs::{LifecycleConfig, StorageConfig};

use crate::executor::{CommandOutput, Executor};
use crate::host::OsKind;
use crate::plugin::InstallerContext;

#[derive(Default)]
struct Inner {
    programs: Mutex<HashSet<String>>,
    responses: Mutex<Vec<(String, CommandOutput)>>,
    files: Mutex<HashMap<PathBuf, String>>,
    dirs: Mutex<HashSet<PathBuf>>,
    calls: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
}

#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<Inner>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs `which` will find.
    pub fn with_programs(self, programs: &[&str]) -> Self {
        self.inner.programs.lock().unwrap().extend(programs.iter().map(|p| p.to_string()));
        self
    }

    /// Answer commands whose joined argv starts with `prefix`. First registered match wins;
    /// anything unmatched succeeds with empty output.
    pub fn respond(self, prefix: &str, output: CommandOutput) -> Self {
        self.inner.responses.lock().unwrap().push((prefix.to_string(), output));
        self
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.inner.files.lock().unwrap().insert(PathBuf::from(path), contents.to_string());
        self
    }

    pub fn failing_writes(self) -> Self {
        self.inner.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn context(&self, os: OsKind) -> InstallerContext {
        InstallerContext::new(Arc::new(self.clone()), Arc::new(StorageConfig::default()), &LifecycleConfig::default())
            .with_os(os)
    }

    pub fn commands(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(prefix))
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.inner.files.lock().unwrap().get(Path::new(path)).cloned()
    }

    pub fn has_dir(&self, path: &Path) -> bool {
        self.inner.dirs.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(&self, argv: &[&str], _timeout: Option<Duration>) -> CommandOutput {
        let line = argv.join(" ");
        self.inner.calls.lock().unwrap().push(line.clone());
        let responses = self.inner.responses.lock().unwrap();
        responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| CommandOutput::ok(""))
    }

    async fn which(&self, program: &str) -> Option<PathBuf> {
        self.inner
            .programs
            .lock()
            .unwrap()
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    async fn read_file(&self, path: &Path) -> std::io::Result<String> {
        self.inner
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
    }

    async fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only filesystem"));
        }
        self.inner.files.lock().unwrap().insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn path_exists(&self, path: &Path) -> bool {
        self.inner.files.lock().unwrap().contains_key(path) || self.inner.dirs.lock().unwrap().contains(path)
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        self.inner.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn name(&self) -> &str {
        "ScriptedExecutor"
    }
}
