#![forbid(unsafe_code)]
//! Async binding for the Claude Code CLI (`claude`) in headless `--print` mode.
//!
//! Shells out to a locally installed `claude` binary, writes the prompt to its stdin, and decodes
//! what it prints into typed [`Message`] values.
//!
//! ## Setup
//! - The binary is resolved per call: [`QueryOptions::path_to_executable`], then
//!   [`ClaudeClientBuilder::binary`], then the `CLAUDE_BINARY` environment variable, then `claude`
//!   on `PATH`. [`is_claude_available`] probes the last two without spawning anything.
//! - The builder sets `DISABLE_AUTOUPDATER=1` for the child unless the caller overrides it.
//! - There is no internal timeout. Cancel the [`CancellationToken`] passed to each call (for
//!   example from a timer task) and the child is killed, reaped, and reported as [`AbortError`].
//!
//! ```rust,no_run
//! use claude_sdk::{CancellationToken, ClaudeClient, PermissionMode, QueryOptions};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClaudeClient::builder().working_dir("/srv/project").build();
//! let options = QueryOptions::new()
//!     .model("claude-sonnet-4-5")
//!     .permission_mode(PermissionMode::Plan)
//!     .max_turns(3);
//! let result = client
//!     .query(&CancellationToken::new(), "Summarize README.md", &options)
//!     .await?;
//! println!("{} ({} turns)", result.result, result.num_turns);
//! # Ok(()) }
//! ```
//!
//! ## Surfaces
//! - [`ClaudeClient::query`] runs `--output-format json` and returns the final [`ResultMessage`].
//! - [`ClaudeClient::query_stream`] runs `--output-format stream-json --verbose` and returns a
//!   [`MessageStream`]. Items arrive in output order; at most one error item is produced and it
//!   is always last. Closing, shutting down, or dropping the stream kills and reaps the child.
//! - [`ClaudeClient::exec`] runs the CLI with arbitrary arguments (e.g. `--version`) and returns
//!   its [`CommandOutput`].
//! - [`parse_stream_json_lines`] decodes a captured stream-json transcript offline and keeps
//!   going past malformed lines.
//!
//! ## Errors
//! Every fallible call returns [`ClaudeError`]. Its `Config`, `Process`, `Parse`, and `Abort`
//! variants wrap [`ConfigError`], [`ProcessError`], [`ParseError`], and [`AbortError`] unchanged;
//! the other variants cover spawn and pipe failures.

use std::{env, fs, path::Path};

mod builder;
mod client;
mod error;
mod mcp;
mod message;
mod options;
mod process;
mod stream;
mod stream_json;

pub use builder::ClaudeClientBuilder;
pub use client::ClaudeClient;
pub use error::{AbortError, ClaudeError, ConfigError, ParseError, ProcessError};
pub use mcp::{McpHttpServerConfig, McpServerConfig, McpSseServerConfig, McpStdioServerConfig};
pub use message::{
    parse_message, AssistantMessage, McpServerStatus, Message, PermissionRequestMessage,
    ResultMessage, SystemMessage, Usage, UserMessage,
};
pub use options::{PermissionMode, QueryOptions};
pub use process::{
    CommandExecutor, CommandOutput, Invocation, ProcessExecutor, ProcessOutput, ProcessStream,
};
pub use stream::{MessageOrError, MessageStream};
pub use stream_json::{parse_stream_json_lines, StreamJsonLine, StreamJsonLineOutcome};

pub use tokio_util::sync::CancellationToken;

/// Whether a `claude` binary can be found without spawning it.
///
/// Honors `CLAUDE_BINARY` when set, otherwise searches `PATH`.
pub fn is_claude_available() -> bool {
    match env::var("CLAUDE_BINARY") {
        Ok(binary) if !binary.trim().is_empty() => binary_exists(Path::new(&binary)),
        _ => binary_exists(Path::new("claude")),
    }
}

/// Paths with a directory component are checked directly; bare names are searched on `PATH`.
pub fn binary_exists(path: &Path) -> bool {
    if path.is_absolute() || path.components().count() > 1 {
        fs::metadata(path).is_ok()
    } else {
        env::var_os("PATH")
            .and_then(|paths| {
                env::split_paths(&paths)
                    .map(|dir| dir.join(path))
                    .find(|candidate| fs::metadata(candidate).is_ok())
            })
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_exists_checks_paths_directly() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("claude");
        assert!(!binary_exists(&binary));

        fs::write(&binary, "#!/bin/sh\n").unwrap();
        assert!(binary_exists(&binary));
    }

    #[test]
    fn bare_names_are_searched_on_path() {
        assert!(!binary_exists(Path::new(
            "claude-sdk-binary-that-does-not-exist"
        )));
    }
}
