//! Runs one prompt through `claude --print --output-format json`.
//!
//! Usage:
//! - `CLAUDE_EXAMPLE_LIVE=1 cargo run -p claude_sdk --example query -- "Hello"`

use std::error::Error;

use claude_sdk::{CancellationToken, PermissionMode, QueryOptions};

#[path = "support/live.rs"]
mod live;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if !live::ready("query") {
        return Ok(());
    }

    let prompt = live::collect_prompt()?;
    let options = QueryOptions::new()
        .permission_mode(PermissionMode::Plan)
        .max_turns(1);
    let result = live::client()
        .query(&CancellationToken::new(), &prompt, &options)
        .await?;

    println!("session: {}", result.session_id);
    println!(
        "turns: {} duration: {}ms tokens: {} in / {} out",
        result.num_turns,
        result.duration_ms,
        result.usage.input_tokens,
        result.usage.output_tokens
    );
    println!("{}", result.result);
    Ok(())
}
