use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Errors surfaced by [`crate::ClaudeClient`] and the executors it drives.
///
/// The four structured kinds (`Config`, `Process`, `Parse`, `Abort`) are passed through
/// unchanged by every layer so callers can branch on them. The remaining variants describe
/// plumbing failures around the child process and are never reported as `Process`.
#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Abort(#[from] AbortError),
    #[error("failed to spawn claude process (binary={binary:?}): {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for claude process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("error reading stream: {0}")]
    StdoutRead(#[source] std::io::Error),
    #[error("failed reading stderr: {0}")]
    StderrRead(#[source] std::io::Error),
    #[error("failed writing stdin: {0}")]
    StdinWrite(#[source] std::io::Error),
    #[error("internal error: missing stdout pipe")]
    MissingStdout,
    #[error("internal error: missing stderr pipe")]
    MissingStderr,
    #[error("internal error: join failure: {0}")]
    Join(String),
}

impl ClaudeError {
    /// Exit code of the child when this is a [`ProcessError`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ClaudeError::Process(err) => Some(err.exit_code),
            _ => None,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, ClaudeError::Abort(_))
    }
}

/// Invalid input detected before any process is started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "configuration error in field '{field}'{}",
    config_detail(.message, .value, .reason)
)]
pub struct ConfigError {
    pub field: String,
    pub value: String,
    pub reason: String,
    /// Direct message; takes precedence over `value`/`reason` when rendering.
    pub message: Option<String>,
}

impl ConfigError {
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            message: None,
        }
    }

    pub fn with_message(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: String::new(),
            reason: String::new(),
            message: Some(message.into()),
        }
    }
}

fn config_detail(message: &Option<String>, value: &str, reason: &str) -> String {
    match message.as_deref() {
        Some(message) if !message.is_empty() => format!(": {message}"),
        _ => format!(" with value '{value}': {reason}"),
    }
}

/// The CLI exited with a non-zero status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("process exited with code {exit_code}: {message}")]
pub struct ProcessError {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Captured diagnostic output of the process.
    pub message: String,
}

impl ProcessError {
    pub(crate) fn from_status(status: ExitStatus, message: impl Into<String>) -> Self {
        Self {
            exit_code: status.code().unwrap_or(-1),
            message: message.into(),
        }
    }
}

/// A line or document could not be decoded into a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to parse message: {message} (line: {line})")]
pub struct ParseError {
    /// The offending raw text, preserved verbatim.
    pub line: String,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            message: message.into(),
        }
    }
}

/// The operation was cancelled before the process finished.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or("operation aborted"))]
pub struct AbortError {
    pub message: Option<String>,
}

impl AbortError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}
