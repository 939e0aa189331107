//! Offline decoding of captured `--output-format stream-json` transcripts.
//!
//! Unlike [`crate::MessageStream`], which stops at the first undecodable line, these helpers are
//! tolerant: every non-blank line yields an outcome so logs can be inspected after the fact.

use crate::{parse_message, Message, ParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamJsonLine {
    /// 1-based line number in the source text.
    pub line_number: usize,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamJsonLineOutcome {
    Ok {
        line: StreamJsonLine,
        message: Message,
    },
    Err {
        line: StreamJsonLine,
        error: ParseError,
    },
}

impl StreamJsonLineOutcome {
    pub fn line(&self) -> &StreamJsonLine {
        match self {
            StreamJsonLineOutcome::Ok { line, .. } | StreamJsonLineOutcome::Err { line, .. } => {
                line
            }
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            StreamJsonLineOutcome::Ok { message, .. } => Some(message),
            StreamJsonLineOutcome::Err { .. } => None,
        }
    }
}

/// Returns `None` for lines that carry no record (empty, whitespace, or a lone `\r`).
pub(crate) fn record_text(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.chars().all(char::is_whitespace) {
        None
    } else {
        Some(line)
    }
}

pub fn parse_stream_json_lines(text: &str) -> Vec<StreamJsonLineOutcome> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let Some(record) = record_text(raw) else {
            continue;
        };
        let line = StreamJsonLine {
            line_number: idx + 1,
            raw: record.to_string(),
        };
        match parse_message(record) {
            Ok(message) => out.push(StreamJsonLineOutcome::Ok { line, message }),
            Err(error) => out.push(StreamJsonLineOutcome::Err { line, error }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_text_skips_blank_and_crlf_only_lines() {
        assert_eq!(record_text(""), None);
        assert_eq!(record_text("   \t"), None);
        assert_eq!(record_text("\r"), None);
        assert_eq!(record_text("{\"k\":1}\r"), Some("{\"k\":1}"));
    }

    #[test]
    fn transcript_parsing_continues_past_failures() {
        let input = "\n{\"type\":\"user\",\"session_id\":\"a\"}\nnot json\r\n\n{\"type\":\"result\",\"session_id\":\"a\"}\n";

        let out = parse_stream_json_lines(input);
        assert_eq!(out.len(), 3);

        assert_eq!(out[0].line().line_number, 2);
        assert_eq!(out[0].message().map(Message::message_type), Some("user"));

        match &out[1] {
            StreamJsonLineOutcome::Err { line, error } => {
                assert_eq!(line.line_number, 3);
                assert_eq!(line.raw, "not json");
                assert_eq!(error.line, "not json");
            }
            other => panic!("expected err, got {other:?}"),
        }

        assert_eq!(out[2].line().line_number, 5);
        assert_eq!(out[2].message().map(Message::message_type), Some("result"));
    }
}
