//! Decodes a captured stream-json transcript offline.
//!
//! Usage:
//! - `claude --print --output-format stream-json --verbose "Hi" > out.jsonl`
//! - `cargo run -p claude_sdk --example parse_transcript -- out.jsonl`

use std::{env, error::Error, fs};

use claude_sdk::{parse_stream_json_lines, StreamJsonLineOutcome};

fn main() -> Result<(), Box<dyn Error>> {
    let path = env::args().nth(1).ok_or("Provide a transcript path")?;
    let text = fs::read_to_string(&path)?;

    let outcomes = parse_stream_json_lines(&text);
    let mut failures = 0usize;
    for outcome in &outcomes {
        match outcome {
            StreamJsonLineOutcome::Ok { line, message } => println!(
                "{:>4}: {} ({})",
                line.line_number,
                message.message_type(),
                message.session_id()
            ),
            StreamJsonLineOutcome::Err { line, error } => {
                failures += 1;
                println!("{:>4}: error: {}", line.line_number, error.message);
            }
        }
    }
    println!("{} records, {failures} undecodable", outcomes.len());
    Ok(())
}
