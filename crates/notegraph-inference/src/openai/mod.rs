//! OpenAI-compatible inference backend.
//!
//! Works with any endpoint speaking the OpenAI embeddings and chat
//! completions API (OpenAI, Azure OpenAI, Ollama's `/v1`, vLLM, LM Studio).
//!
//! # Example
//!
//! ```rust,no_run
//! use notegraph_core::EmbeddingBackend;
//! use notegraph_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::new(OpenAIConfig {
//!         base_url: "http://localhost:11434/v1".to_string(),
//!         embed_model: "nomic-embed-text".to_string(),
//!         embed_dimension: 768,
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let texts = vec!["Hello, world!".to_string()];
//!     let vectors = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig, DEFAULT_GEN_MODEL, DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{to_notegraph_error, transport_error, Endpoint, OpenAIErrorCode};
pub use types::*;
