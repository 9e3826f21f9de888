//! One-shot (non-streaming) completion.
//!
//! Run with:
//!   INFERSTREAM_ENDPOINT=http://localhost:5143 INFERSTREAM_API_KEY=... \
//!     cargo run --example one_shot

use inferstream::{Client, Model, Template};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = Client::from_env()?;

    let model = Model::new("mistral-7b-instruct-v0.1.Q4_K_M.gguf").with_ctx(8192);

    // Make sure the model is resident before inference
    client.load_model(&model).await?;

    let result = client
        .completion("summarize this text to the main bullet points: Rust is a systems language.")
        .model(model)
        .template(Template::new("<s>[INST] {prompt} [/INST]")?)
        .complete()
        .await?;

    println!("Model response:");
    println!("{}", result.text);
    println!("Raw payload:");
    println!("{}", serde_json::to_string_pretty(&result.data)?);

    Ok(())
}
