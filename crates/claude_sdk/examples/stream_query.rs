//! Streams messages from `claude --print --output-format stream-json` as they are produced.
//!
//! Usage:
//! - `CLAUDE_EXAMPLE_LIVE=1 cargo run -p claude_sdk --example stream_query -- "Hello"`
//! - Optional deadline in seconds: `CLAUDE_EXAMPLE_DEADLINE_SECS=30`

use std::{env, error::Error, time::Duration};

use claude_sdk::{CancellationToken, Message, QueryOptions};

#[path = "support/live.rs"]
mod live;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if !live::ready("stream_query") {
        return Ok(());
    }

    let prompt = live::collect_prompt()?;
    let deadline = env::var("CLAUDE_EXAMPLE_DEADLINE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(120));

    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        timer.cancel();
    });

    let client = live::client();
    let options = QueryOptions::new().max_turns(1);
    let mut stream = client.query_stream(&cancel, &prompt, &options).await?;

    while let Some(item) = stream.next_message().await {
        match item? {
            Message::System(system) => {
                println!("[system] model={} tools={}", system.model, system.tools.len())
            }
            Message::Assistant(assistant) => println!("[assistant] {}", assistant.message),
            Message::User(user) => println!("[user] {}", user.message),
            Message::Result(result) => println!(
                "[result] {} turns, ${:.4}: {}",
                result.num_turns, result.total_cost_usd, result.result
            ),
            Message::PermissionRequest(req) => println!("[permission] {}", req.subtype),
        }
    }

    if cancel.is_cancelled() {
        eprintln!("deadline of {deadline:?} reached");
    }
    Ok(())
}
