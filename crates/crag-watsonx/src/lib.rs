//! WatsonX AI integration for complaint RAG
//!
//! This crate provides the WatsonX implementation of the LLMProvider trait,
//! streaming generated text from the `text/generation_stream` endpoint.

mod client;
mod config;

#[cfg(test)]
mod tests;

pub use client::WatsonxClient;
pub use config::{DEFAULT_API_URL, DEFAULT_IAM_URL, DEFAULT_MODEL_ID, WatsonxConfig};

// Re-export core types for convenience
pub use crag_core::{Error, GenerationConfig, GenerationResult, LLMProvider, Result};
