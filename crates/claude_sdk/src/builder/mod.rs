use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use crate::{client::ClaudeClient, CommandExecutor, ProcessExecutor};

#[derive(Debug, Clone, Default)]
pub struct ClaudeClientBuilder {
    pub(crate) binary: Option<PathBuf>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) mirror_stderr: bool,
    pub(crate) executor: Option<Arc<dyn CommandExecutor>>,
}

impl ClaudeClientBuilder {
    /// Default CLI binary; a per-call `QueryOptions::path_to_executable` takes precedence.
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Default working directory; a per-call `QueryOptions::working_dir` takes precedence.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Echo the CLI's stderr to this process's stderr. Ignored when a custom executor is set.
    pub fn mirror_stderr(mut self, enabled: bool) -> Self {
        self.mirror_stderr = enabled;
        self
    }

    /// Replaces the subprocess executor, e.g. with a scripted one in tests.
    pub fn executor(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn build(mut self) -> ClaudeClient {
        // Avoid any updater side effects by default; callers may override explicitly.
        self.env
            .entry("DISABLE_AUTOUPDATER".to_string())
            .or_insert_with(|| "1".to_string());

        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(ProcessExecutor::new().mirror_stderr(self.mirror_stderr))
        });

        ClaudeClient {
            binary: self.binary,
            working_dir: self.working_dir,
            env: self.env,
            executor,
        }
    }
}
