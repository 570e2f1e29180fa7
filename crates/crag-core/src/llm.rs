//! LLM provider trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Configuration for text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Replaces the model the provider was configured with, when set
    pub model_id: Option<String>,
    /// Upper bound on generated tokens
    pub max_new_tokens: u32,
    /// Floor that discourages degenerate one-word answers
    pub min_new_tokens: u32,
    /// `None` or `0.0` selects greedy decoding
    pub temperature: Option<f32>,
    pub repetition_penalty: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: None,
            max_new_tokens: 256,
            min_new_tokens: 20,
            temperature: None,
            repetition_penalty: 1.1,
            top_p: Some(1.0),
            top_k: Some(50),
            stop_sequences: vec!["Question:".to_string()],
        }
    }
}

impl GenerationConfig {
    /// Whether generation is free of sampling randomness
    pub fn is_deterministic(&self) -> bool {
        self.temperature.is_none_or(|t| t <= 0.0)
    }
}

/// Result of a text generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub model_id: String,
    pub tokens_generated: Option<u32>,
}

/// Producer half of a streamed generation
///
/// Wraps a bounded channel: `send` waits for capacity instead of dropping a
/// fragment, and fragments arrive at the consumer in send order.
#[derive(Debug, Clone)]
pub struct FragmentSink {
    sender: mpsc::Sender<Result<String>>,
}

impl FragmentSink {
    pub fn new(sender: mpsc::Sender<Result<String>>) -> Self {
        Self { sender }
    }

    /// Deliver one fragment. Returns `false` once the consumer has gone away.
    pub async fn send(&self, fragment: impl Into<String>) -> bool {
        self.sender.send(Ok(fragment.into())).await.is_ok()
    }

    /// Deliver a terminal error to the consumer
    pub async fn fail(&self, error: Error) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Trait for generation models (e.g., watsonx.ai, a local model)
///
/// Under deterministic settings the concatenation of everything a model
/// sends through `generate_stream` equals the text `generate` returns for
/// the same prompt.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate the complete answer for a prompt
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<GenerationResult>;

    /// Generate, pushing fragments into `sink` as they are produced.
    /// Returns once the model signals end of output or the token budget is spent.
    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        sink: FragmentSink,
    ) -> Result<()>;

    /// Get the model ID being used
    fn model_id(&self) -> &str;
}
