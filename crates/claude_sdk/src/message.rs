use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ParseError;

/// One decoded record of the CLI's JSON output, routed by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    Result(ResultMessage),
    System(SystemMessage),
    PermissionRequest(PermissionRequestMessage),
}

impl Message {
    /// The wire value of the `type` discriminator for this variant.
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
            Message::Result(_) => "result",
            Message::System(_) => "system",
            Message::PermissionRequest(_) => "permission_request",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Message::User(msg) => &msg.session_id,
            Message::Assistant(msg) => &msg.session_id,
            Message::Result(msg) => &msg.session_id,
            Message::System(msg) => &msg.session_id,
            Message::PermissionRequest(msg) => &msg.session_id,
        }
    }

    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Message::Result(msg) => Some(msg),
            _ => None,
        }
    }
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        parse_message(line)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMessage {
    /// Opaque message payload as emitted by the CLI.
    pub message: Value,
    pub parent_tool_use_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantMessage {
    pub message: Value,
    pub parent_tool_use_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
}

/// Terminal record of a completed exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub subtype: String,
    #[serde(deserialize_with = "null_as_default")]
    pub duration_ms: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub duration_api_ms: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_error: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub num_turns: u32,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub result: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_cost_usd: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub subtype: String,
    #[serde(deserialize_with = "null_as_default", rename = "apiKeySource")]
    pub api_key_source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cwd: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tools: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub mcp_servers: Vec<McpServerStatus>,
    #[serde(deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(deserialize_with = "null_as_default", rename = "permissionMode")]
    pub permission_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionRequestMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subtype: String,
}

/// Token accounting for one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "is_zero")]
    pub cache_creation_input_tokens: u64,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "is_zero")]
    pub cache_read_input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// The CLI writes `null` for values it has not computed yet.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Decodes one non-blank line of CLI output.
///
/// The `type` discriminator is read first; the full record is then decoded into the matching
/// variant. Missing fields take their default values, but a malformed line, a missing
/// discriminator or an unknown one is a [`ParseError`] that carries the raw line.
pub fn parse_message(line: &str) -> Result<Message, ParseError> {
    let value: Value =
        serde_json::from_str(line).map_err(|err| ParseError::new(line, err.to_string()))?;

    let message_type = match value.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        _ => return Err(ParseError::new(line, "message missing `type`")),
    };

    match message_type.as_str() {
        "user" => decode(line, value, "user").map(Message::User),
        "assistant" => decode(line, value, "assistant").map(Message::Assistant),
        "result" => decode(line, value, "result").map(Message::Result),
        "system" => decode(line, value, "system").map(Message::System),
        "permission_request" => {
            decode(line, value, "permission request").map(Message::PermissionRequest)
        }
        other => Err(ParseError::new(
            line,
            format!("unknown message type: {other}"),
        )),
    }
}

fn decode<T: DeserializeOwned>(line: &str, value: Value, kind: &str) -> Result<T, ParseError> {
    serde_json::from_value(value)
        .map_err(|err| ParseError::new(line, format!("failed to parse {kind} message: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn routes_every_known_discriminator() {
        let cases = [
            (r#"{"type":"user","message":{"text":"hi"},"session_id":"s"}"#, "user"),
            (r#"{"type":"assistant","message":{"text":"yo"},"session_id":"s"}"#, "assistant"),
            (r#"{"type":"result","subtype":"success","session_id":"s"}"#, "result"),
            (r#"{"type":"system","subtype":"init","session_id":"s"}"#, "system"),
            (r#"{"type":"permission_request","subtype":"tool","session_id":"s"}"#, "permission_request"),
        ];
        for (line, expected) in cases {
            let msg = parse_message(line).unwrap();
            assert_eq!(msg.message_type(), expected);
            assert_eq!(msg.session_id(), "s");
        }
    }

    #[test]
    fn decodes_result_fields() {
        let line = json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 1000,
            "duration_api_ms": 800,
            "is_error": false,
            "num_turns": 1,
            "result": "Hello! How can I help you?",
            "session_id": "test-session",
            "total_cost_usd": 0.001,
            "usage": {"input_tokens": 10, "output_tokens": 20, "cache_read_input_tokens": 5}
        })
        .to_string();

        let msg = parse_message(&line).unwrap();
        let result = msg.as_result().expect("result variant");
        assert_eq!(result.duration_ms, 1000);
        assert_eq!(result.duration_api_ms, 800);
        assert_eq!(result.num_turns, 1);
        assert_eq!(result.result, "Hello! How can I help you?");
        assert_eq!(result.total_cost_usd, 0.001);
        assert_eq!(
            result.usage,
            Usage {
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: 5,
                input_tokens: 10,
                output_tokens: 20,
            }
        );
    }

    #[test]
    fn decodes_system_metadata_with_camel_case_fields() {
        let line = json!({
            "type": "system",
            "subtype": "init",
            "apiKeySource": "env",
            "cwd": "/work",
            "session_id": "abc",
            "tools": ["Read", "Bash"],
            "mcp_servers": [
                {"name": "files", "status": "connected"},
                {"name": "db", "status": "failed", "error": "refused"}
            ],
            "model": "claude-sonnet",
            "permissionMode": "plan"
        })
        .to_string();

        let Message::System(system) = parse_message(&line).unwrap() else {
            panic!("expected system message");
        };
        assert_eq!(system.api_key_source, "env");
        assert_eq!(system.permission_mode, "plan");
        assert_eq!(system.tools, vec!["Read", "Bash"]);
        assert_eq!(system.mcp_servers[0].error, None);
        assert_eq!(system.mcp_servers[1].error.as_deref(), Some("refused"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let Message::User(user) = parse_message(r#"{"type":"user"}"#).unwrap() else {
            panic!("expected user message");
        };
        assert_eq!(user, UserMessage::default());

        let Message::Assistant(assistant) =
            parse_message(r#"{"type":"assistant","parent_tool_use_id":"tool-1","extra":true}"#)
                .unwrap()
        else {
            panic!("expected assistant message");
        };
        assert_eq!(assistant.parent_tool_use_id.as_deref(), Some("tool-1"));
    }

    #[test]
    fn explicit_nulls_take_defaults() {
        let message = parse_message(
            r#"{"type":"result","subtype":"error_during_execution","result":null,"session_id":null,"total_cost_usd":null,"usage":null,"is_error":true}"#,
        )
        .unwrap();
        let result = message.as_result().unwrap();
        assert_eq!(result.subtype, "error_during_execution");
        assert_eq!(result.result, "");
        assert_eq!(result.session_id, "");
        assert_eq!(result.total_cost_usd, 0.0);
        assert_eq!(result.usage, Usage::default());
        assert!(result.is_error);

        let Message::System(system) =
            parse_message(r#"{"type":"system","tools":null,"mcp_servers":[{"name":"fs","status":null}]}"#)
                .unwrap()
        else {
            panic!("expected system message");
        };
        assert!(system.tools.is_empty());
        assert_eq!(system.mcp_servers[0].status, "");
    }

    #[test]
    fn malformed_lines_keep_the_raw_text() {
        let err = parse_message("{invalid json}").unwrap_err();
        assert_eq!(err.line, "{invalid json}");
        assert!(!err.message.is_empty());

        let err = parse_message(r#"{"type":"mystery"}"#).unwrap_err();
        assert_eq!(err.message, "unknown message type: mystery");

        let err = parse_message(r#"{"session_id":"s"}"#).unwrap_err();
        assert_eq!(err.message, "message missing `type`");

        let err = parse_message(r#"{"type":7}"#).unwrap_err();
        assert_eq!(err.message, "message missing `type`");
    }

    #[test]
    fn wrongly_typed_fields_fail_the_variant_decode() {
        let err = parse_message(r#"{"type":"result","num_turns":"three"}"#).unwrap_err();
        assert!(
            err.message.starts_with("failed to parse result message:"),
            "{}",
            err.message
        );
    }

    #[test]
    fn usage_omits_zero_cache_counters_when_serialized() {
        let usage = Usage {
            input_tokens: 3,
            output_tokens: 4,
            ..Usage::default()
        };
        assert_eq!(
            serde_json::to_value(usage).unwrap(),
            json!({"input_tokens": 3, "output_tokens": 4})
        );
    }
}
