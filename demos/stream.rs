//! Streaming completion, printing tokens as they arrive.
//!
//! Run with:
//!   INFERSTREAM_ENDPOINT=http://localhost:5143 INFERSTREAM_API_KEY=... \
//!     cargo run --example stream

use inferstream::{Client, Model, StreamEvent, Template};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = Client::from_env()?;

    let mut stream = client
        .completion("list the planets in the solar system")
        .model(Model::new("mistral-7b-instruct-v0.1.Q4_K_M.gguf").with_ctx(4096))
        .template(Template::new("<s>[INST] {prompt} [/INST]")?)
        .temperature(0.6)
        .stream()
        .await?;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Token { text, .. } => {
                print!("{text}");
                use std::io::Write;
                std::io::stdout().flush()?;
            }
            StreamEvent::Diagnostic(msg) => {
                eprintln!("SYSTEM: {} {:?}", msg.content, msg.data);
            }
        }
    }

    let result = stream.finalize()?;
    println!("\n\nRESULT:");
    println!("{}", result.text);
    if let Some(stats) = result.stats {
        println!(
            "{} tokens, {:.1} tok/s, total {}",
            stats.total_tokens, stats.tokens_per_second, stats.total_time_format
        );
    }

    Ok(())
}
