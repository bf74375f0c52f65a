//! Replays a recorded NDJSON event log and prints each snapshot.
//!
//! ```text
//! cargo run -p reasoning-stream --example replay_ndjson -- events.ndjson
//! ```
use futures::stream;
use reasoning_stream::observability::init_observability;
use reasoning_stream::prelude::*;
use reasoning_stream::transport::ndjson_events;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_observability();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: replay_ndjson <events.ndjson>")?;
    let body = std::fs::read(&path)?;
    let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = body
        .chunks(512)
        .map(|chunk| Ok(bytes::Bytes::copy_from_slice(chunk)))
        .collect();

    let mut run = reconstruct(ndjson_events(stream::iter(chunks)), BuilderConfig::from_env()?)?;
    while let Some(snapshot) = run.next_snapshot().await {
        let label = if snapshot.is_final { "final" } else { "update" };
        println!("--- {label} ({} steps)", snapshot.response.len());
        for step in snapshot.response.steps() {
            println!("{:>12} {:<10} {}", step.id, step.state, step.name);
        }
    }

    let response = run.finish().await?;
    println!("{}", response.answer_text());
    Ok(())
}
