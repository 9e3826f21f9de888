//! Streaming completion client for local LLM inference servers.
//!
//! Speaks the `/completion` protocol of llama.cpp proxy servers: a plain
//! JSON response for one-shot requests, or a server-sent-event stream of
//! `token`/`system` messages ending in a `result` payload.
//!
//! # Example
//! ```no_run
//! use inferstream::{Client, Model, Template};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), inferstream::Error> {
//!     let client = Client::builder()
//!         .endpoint("http://localhost:5143")
//!         .api_key("my-key")
//!         .build()?;
//!
//!     let mut stream = client
//!         .completion("list the planets in the solar system")
//!         .model(Model::new("mistral-7b-instruct-v0.1.Q4_K_M.gguf").with_ctx(4096))
//!         .template(Template::new("<s>[INST] {prompt} [/INST]")?)
//!         .temperature(0.6)
//!         .stream()
//!         .await?;
//!
//!     while let Some(event) = stream.next().await {
//!         if let Some(text) = event?.text() {
//!             print!("{text}");
//!         }
//!     }
//!
//!     let result = stream.finalize()?;
//!     println!("\n{} tokens", result.stats.map_or(0, |s| s.total_tokens));
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod sse;
pub mod stream;
pub mod template;
pub mod types;

pub use client::{Client, ClientBuilder, RequestBuilder};
pub use error::{Error, ErrorKind};
pub use stream::CompletionStream;
pub use template::Template;
pub use types::*;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
