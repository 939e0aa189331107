use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use crate::{mcp, ConfigError, McpServerConfig};

/// How the CLI handles permission prompts for tool use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub const ALL: [PermissionMode; 4] = [
        PermissionMode::Default,
        PermissionMode::AcceptEdits,
        PermissionMode::BypassPermissions,
        PermissionMode::Plan,
    ];

    pub fn as_arg_value(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg_value())
    }
}

impl FromStr for PermissionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionMode::ALL
            .into_iter()
            .find(|mode| mode.as_arg_value() == s)
            .ok_or_else(|| {
                ConfigError::invalid(
                    "permission_mode",
                    s,
                    "must be 'default', 'acceptEdits', 'bypassPermissions', or 'plan'",
                )
            })
    }
}

impl From<PermissionMode> for String {
    fn from(mode: PermissionMode) -> Self {
        mode.as_arg_value().to_string()
    }
}

/// Per-call options mapped onto `claude` CLI flags.
///
/// Every field defaults to "unset"; unset fields contribute no flags. Numeric limits are signed
/// so that out-of-range values can be reported by [`QueryOptions::validate`] instead of being
/// silently clamped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub(crate) model: Option<String>,
    pub(crate) fallback_model: Option<String>,
    pub(crate) continue_session: bool,
    pub(crate) resume: Option<String>,
    pub(crate) custom_system_prompt: Option<String>,
    pub(crate) append_system_prompt: Option<String>,
    pub(crate) allowed_tools: Vec<String>,
    pub(crate) disallowed_tools: Vec<String>,
    pub(crate) max_thinking_tokens: Option<i32>,
    pub(crate) max_turns: Option<i32>,
    pub(crate) permission_mode: Option<String>,
    pub(crate) permission_prompt_tool_name: Option<String>,
    pub(crate) mcp_servers: BTreeMap<String, McpServerConfig>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) path_to_executable: Option<PathBuf>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = non_empty(model.into());
        self
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = non_empty(model.into());
        self
    }

    /// Continues the most recent conversation (`--continue`).
    pub fn continue_session(mut self, enabled: bool) -> Self {
        self.continue_session = enabled;
        self
    }

    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = non_empty(session_id.into());
        self
    }

    /// Replaces the default system prompt (`--system-prompt`).
    pub fn custom_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = non_empty(prompt.into());
        self
    }

    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.append_system_prompt = non_empty(prompt.into());
        self
    }

    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn disallowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_thinking_tokens(mut self, tokens: i32) -> Self {
        self.max_thinking_tokens = Some(tokens);
        self
    }

    pub fn max_turns(mut self, turns: i32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    /// Accepts a [`PermissionMode`] or a raw string; raw strings are checked by
    /// [`QueryOptions::validate`].
    pub fn permission_mode(mut self, mode: impl Into<String>) -> Self {
        self.permission_mode = non_empty(mode.into());
        self
    }

    pub fn permission_prompt_tool_name(mut self, tool: impl Into<String>) -> Self {
        self.permission_prompt_tool_name = non_empty(tool.into());
        self
    }

    pub fn mcp_server(mut self, name: impl Into<String>, config: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), config);
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Overrides the CLI binary for this call.
    pub fn path_to_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.path_to_executable = Some(path.into());
        self
    }

    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn get_path_to_executable(&self) -> Option<&PathBuf> {
        self.path_to_executable.as_ref()
    }

    /// Checks the option invariants; the first violation is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(tokens) = self.max_thinking_tokens.filter(|v| *v < 0) {
            return Err(ConfigError::invalid(
                "max_thinking_tokens",
                tokens.to_string(),
                "must be non-negative",
            ));
        }

        if let Some(turns) = self.max_turns.filter(|v| *v < 0) {
            return Err(ConfigError::invalid(
                "max_turns",
                turns.to_string(),
                "must be non-negative",
            ));
        }

        for (name, server) in &self.mcp_servers {
            server.validate(name)?;
        }

        if let Some(mode) = self.permission_mode.as_deref() {
            mode.parse::<PermissionMode>()?;
        }

        Ok(())
    }

    /// Flags derived from the set fields, in the order the CLI documents them.
    ///
    /// The output-format flags are not included; the client prepends them per call mode.
    pub fn argv(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();

        if let Some(model) = self.model.as_ref() {
            push_pair(&mut out, "--model", model);
        }

        if let Some(model) = self.fallback_model.as_ref() {
            push_pair(&mut out, "--fallback-model", model);
        }

        if self.continue_session {
            out.push("--continue".to_string());
        }

        if let Some(session_id) = self.resume.as_ref() {
            push_pair(&mut out, "--resume", session_id);
        }

        if let Some(prompt) = self.custom_system_prompt.as_ref() {
            push_pair(&mut out, "--system-prompt", prompt);
        }

        if let Some(prompt) = self.append_system_prompt.as_ref() {
            push_pair(&mut out, "--append-system-prompt", prompt);
        }

        if !self.allowed_tools.is_empty() {
            push_pair(&mut out, "--allowed-tools", &self.allowed_tools.join(","));
        }

        if !self.disallowed_tools.is_empty() {
            push_pair(&mut out, "--disallowed-tools", &self.disallowed_tools.join(","));
        }

        if let Some(tokens) = self.max_thinking_tokens {
            push_pair(&mut out, "--max-thinking-tokens", &tokens.to_string());
        }

        if let Some(turns) = self.max_turns {
            push_pair(&mut out, "--max-turns", &turns.to_string());
        }

        if let Some(mode) = self.permission_mode.as_ref() {
            push_pair(&mut out, "--permission-mode", mode);
        }

        if let Some(tool) = self.permission_prompt_tool_name.as_ref() {
            push_pair(&mut out, "--permission-prompt-tool-name", tool);
        }

        if !self.mcp_servers.is_empty() {
            push_pair(&mut out, "--mcp-servers", &mcp::servers_arg(&self.mcp_servers));
        }

        out
    }
}

fn push_pair(out: &mut Vec<String>, flag: &str, value: &str) {
    out.push(flag.to_string());
    out.push(value.to_string());
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
