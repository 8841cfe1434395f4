//! # notegraph-inference
//!
//! Inference backends for the notegraph enrichment pipeline.
//!
//! This crate provides:
//! - An OpenAI-compatible backend for embeddings and chat generation
//! - [`LlmExtractor`], which turns a generation backend into an
//!   [`ExtractionBackend`] for batched per-user note extraction
//! - Embedding input preparation
//! - Deterministic mock backends (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable the in-process mock backends for downstream tests

pub mod embedding;
pub mod extractor;
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use notegraph_core::*;

pub use embedding::{embedding_text, note_embedding_text};
pub use extractor::{build_prompt, parse_response, LlmExtractor, EXTRACTION_SYSTEM_PROMPT};
pub use openai::{OpenAIBackend, OpenAIConfig};
