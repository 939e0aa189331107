//! Small helper for examples that need a real Claude Code CLI binary.
//!
//! Conventions:
//! - Examples default to using the caller's existing config/auth state.
//! - Set `CLAUDE_EXAMPLE_LIVE=1` to enable examples that may require network/auth.
//! - `CLAUDE_BINARY` picks the binary; otherwise `claude` is resolved on `PATH`.

#![allow(dead_code)]

use std::{env, error::Error};

use claude_sdk::{is_claude_available, ClaudeClient};

pub const ENV_EXAMPLE_LIVE: &str = "CLAUDE_EXAMPLE_LIVE";

pub fn live_enabled() -> bool {
    matches!(
        env::var(ENV_EXAMPLE_LIVE).ok().as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

/// Returns `false` (after explaining why) when the example should not talk to the real CLI.
pub fn ready(example_name: &str) -> bool {
    if !live_enabled() {
        eprintln!(
            "skipped {example_name}: set {ENV_EXAMPLE_LIVE}=1 to run examples that may require network/auth"
        );
        return false;
    }
    if !is_claude_available() {
        eprintln!("skipped {example_name}: no claude binary on PATH (or set CLAUDE_BINARY)");
        return false;
    }
    true
}

pub fn client() -> ClaudeClient {
    ClaudeClient::builder().mirror_stderr(true).build()
}

pub fn collect_prompt() -> Result<String, Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        return Err("Provide a prompt string".into());
    }
    Ok(args.join(" "))
}
