use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::ConfigError;

/// Configuration for one MCP server handed to the CLI through `--mcp-servers`.
///
/// Deserializes from the same `{"type": "stdio" | "sse" | "http", ...}` shape that
/// [`McpServerConfig::to_value`] produces, so configs can be loaded from JSON files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    Stdio(McpStdioServerConfig),
    Sse(McpSseServerConfig),
    Http(McpHttpServerConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct McpStdioServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct McpSseServerConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct McpHttpServerConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>) -> Self {
        McpServerConfig::Stdio(McpStdioServerConfig {
            command: command.into(),
            ..Default::default()
        })
    }

    pub fn sse(url: impl Into<String>) -> Self {
        McpServerConfig::Sse(McpSseServerConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    pub fn http(url: impl Into<String>) -> Self {
        McpServerConfig::Http(McpHttpServerConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    /// Appends process arguments; ignored for URL-based transports.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let McpServerConfig::Stdio(cfg) = &mut self {
            cfg.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Adds an environment variable; ignored for URL-based transports.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let McpServerConfig::Stdio(cfg) = &mut self {
            cfg.env.insert(key.into(), value.into());
        }
        self
    }

    /// Adds an HTTP header; ignored for stdio servers.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            McpServerConfig::Sse(McpSseServerConfig { headers, .. })
            | McpServerConfig::Http(McpHttpServerConfig { headers, .. }) => {
                headers.insert(key.into(), value.into());
            }
            McpServerConfig::Stdio(_) => {}
        }
        self
    }

    pub fn transport(&self) -> &'static str {
        match self {
            McpServerConfig::Stdio(_) => "stdio",
            McpServerConfig::Sse(_) => "sse",
            McpServerConfig::Http(_) => "http",
        }
    }

    /// JSON representation passed to the CLI. Empty collections are omitted.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".to_string(), json!(self.transport()));
        match self {
            McpServerConfig::Stdio(cfg) => {
                out.insert("command".to_string(), json!(cfg.command));
                if !cfg.args.is_empty() {
                    out.insert("args".to_string(), json!(cfg.args));
                }
                if !cfg.env.is_empty() {
                    out.insert("env".to_string(), json!(cfg.env));
                }
            }
            McpServerConfig::Sse(McpSseServerConfig { url, headers })
            | McpServerConfig::Http(McpHttpServerConfig { url, headers }) => {
                out.insert("url".to_string(), json!(url));
                if !headers.is_empty() {
                    out.insert("headers".to_string(), json!(headers));
                }
            }
        }
        Value::Object(out)
    }

    pub fn to_arg(&self) -> String {
        self.to_value().to_string()
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let field = format!("mcp_servers[{name}]");
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(
                field,
                name,
                "server name must not be empty",
            ));
        }
        match self {
            McpServerConfig::Stdio(cfg) if cfg.command.trim().is_empty() => Err(
                ConfigError::invalid(field, &cfg.command, "server command must not be empty"),
            ),
            McpServerConfig::Sse(McpSseServerConfig { url, .. })
            | McpServerConfig::Http(McpHttpServerConfig { url, .. })
                if url.trim().is_empty() =>
            {
                Err(ConfigError::invalid(field, url, "server URL must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Builds the `--mcp-servers` JSON object keyed by server name.
pub(crate) fn servers_arg(servers: &BTreeMap<String, McpServerConfig>) -> String {
    let object: Map<String, Value> = servers
        .iter()
        .map(|(name, cfg)| (name.clone(), cfg.to_value()))
        .collect();
    Value::Object(object).to_string()
}
