use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    builder::ClaudeClientBuilder, ClaudeError, CommandExecutor, CommandOutput, ConfigError,
    Invocation, MessageStream, ParseError, QueryOptions, ResultMessage,
};

const ONE_SHOT_ARGS: [&str; 3] = ["--print", "--output-format", "json"];
const STREAMING_ARGS: [&str; 4] = ["--print", "--output-format", "stream-json", "--verbose"];

/// Runs prompts through the `claude` CLI.
///
/// Cheap to clone; clones share the executor.
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    pub(crate) binary: Option<PathBuf>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) executor: Arc<dyn CommandExecutor>,
}

impl Default for ClaudeClient {
    fn default() -> Self {
        ClaudeClientBuilder::default().build()
    }
}

impl ClaudeClient {
    pub fn builder() -> ClaudeClientBuilder {
        ClaudeClientBuilder::default()
    }

    /// Sends `prompt` and waits for the final [`ResultMessage`].
    ///
    /// Runs `claude --print --output-format json`, writing the prompt to stdin. Cancelling
    /// `cancel` kills the process and yields [`crate::AbortError`].
    ///
    /// The result is decoded from stdout. When decoding fails, [`ParseError::line`] holds the
    /// combined stdout and stderr so diagnostics printed to either stream are kept.
    pub async fn query(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<ResultMessage, ClaudeError> {
        let invocation = self.prompt_invocation(cancel, prompt, options, &ONE_SHOT_ARGS)?;
        debug!(binary = ?invocation.binary, args = ?invocation.args, "running claude query");

        let output = self.executor.execute(invocation).await?;
        serde_json::from_slice::<ResultMessage>(&output.stdout).map_err(|err| {
            ParseError::new(
                String::from_utf8_lossy(&output.combined()),
                format!("failed to parse JSON response: {err}"),
            )
            .into()
        })
    }

    /// Sends `prompt` and returns the CLI's messages as they are produced.
    ///
    /// Errors before the process starts (invalid input, spawn failure) are returned directly.
    /// Everything after that arrives through the stream, which ends after at most one error.
    pub async fn query_stream(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<MessageStream, ClaudeError> {
        let invocation = self.prompt_invocation(cancel, prompt, options, &STREAMING_ARGS)?;
        debug!(binary = ?invocation.binary, args = ?invocation.args, "starting claude stream");

        let token = invocation.cancel.clone();
        match self.executor.execute_stream(invocation).await {
            Ok(output) => Ok(MessageStream::spawn(output, token)),
            Err(err) => {
                token.cancel();
                Err(err)
            }
        }
    }

    /// Runs the CLI with arbitrary arguments and no stdin.
    pub async fn exec<I, S>(
        &self,
        cancel: &CancellationToken,
        args: I,
    ) -> Result<CommandOutput, ClaudeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = Invocation::new(
            self.resolve_binary(None),
            args.into_iter().map(Into::into).collect(),
        );
        invocation.working_dir = self.working_dir.clone();
        invocation.env = self.env.clone();
        invocation.cancel = cancel.child_token();
        debug!(binary = ?invocation.binary, args = ?invocation.args, "running claude");
        self.executor.execute(invocation).await
    }

    fn prompt_invocation(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        options: &QueryOptions,
        mode_args: &[&str],
    ) -> Result<Invocation, ClaudeError> {
        if prompt.is_empty() {
            return Err(ConfigError::with_message("prompt", "prompt is required").into());
        }
        options.validate()?;

        let mut args: Vec<String> = mode_args.iter().map(|arg| arg.to_string()).collect();
        args.extend(options.argv());

        let mut invocation = Invocation::new(
            self.resolve_binary(options.get_path_to_executable()),
            args,
        );
        invocation.stdin = Some(prompt.to_string());
        invocation.working_dir = options
            .get_working_dir()
            .or(self.working_dir.as_ref())
            .cloned();
        invocation.env = self.env.clone();
        invocation.cancel = cancel.child_token();
        Ok(invocation)
    }

    fn resolve_binary(&self, per_call: Option<&PathBuf>) -> PathBuf {
        if let Some(b) = per_call.or(self.binary.as_ref()) {
            return b.clone();
        }
        if let Ok(v) = std::env::var("CLAUDE_BINARY") {
            if !v.trim().is_empty() {
                return PathBuf::from(v);
            }
        }
        PathBuf::from("claude")
    }
}
