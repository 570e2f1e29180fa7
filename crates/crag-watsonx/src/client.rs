//! WatsonX AI client implementation

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crag_core::{Error, FragmentSink, GenerationConfig, GenerationResult, LLMProvider, Result};

use crate::config::WatsonxConfig;

const API_VERSION: &str = "2023-05-29";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// WatsonX AI client
///
/// Both generation modes read the `text/generation_stream` endpoint: the
/// streaming mode forwards each server-sent event as a fragment, the blocking
/// mode concatenates the same events. Only connection setup is bounded by a
/// timeout; a stalled generation is waited on indefinitely.
pub struct WatsonxClient {
    config: WatsonxConfig,
    access_token: Option<String>,
    client: Client,
}

#[derive(Serialize)]
struct TokenRequest {
    grant_type: String,
    apikey: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct GenerationParams {
    decoding_method: &'static str,
    max_new_tokens: u32,
    min_new_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    repetition_penalty: f32,
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerationRequest {
    input: String,
    parameters: GenerationParams,
    model_id: String,
    project_id: String,
}

#[derive(Deserialize)]
struct GenerationEvent {
    #[serde(default)]
    results: Vec<EventResult>,
    #[serde(default)]
    errors: Vec<EventError>,
}

#[derive(Deserialize)]
struct EventResult {
    #[serde(default)]
    generated_text: String,
    generated_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct EventError {
    message: String,
}

/// A decoded `data:` event from the generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamEvent {
    pub text: String,
    pub token_count: Option<u32>,
}

/// Splits a server-sent-event byte stream into decoded generation events
///
/// Bytes are buffered until a full line is available, so events and
/// multi-byte characters split across network chunks decode correctly.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line))? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Result<Option<StreamEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Result<Option<StreamEvent>> {
    let Some(data) = line.trim_end_matches(['\r', '\n']).strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let event: GenerationEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "skipping unparseable generation event");
            return Ok(None);
        }
    };

    if let Some(error) = event.errors.first() {
        return Err(Error::Model(format!("WatsonX reported: {}", error.message)));
    }

    Ok(event.results.into_iter().next().map(|result| StreamEvent {
        text: result.generated_text,
        token_count: result.generated_token_count,
    }))
}

impl WatsonxClient {
    /// Model constants
    pub const GRANITE_4_H_SMALL: &'static str = "ibm/granite-4-h-small";
    pub const GRANITE_3_3_8B_INSTRUCT: &'static str = "ibm/granite-3-3-8b-instruct";

    /// Create a new WatsonX client from configuration
    pub fn new(config: WatsonxConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            access_token: None,
            client,
        })
    }

    /// Create a new WatsonX client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = WatsonxConfig::from_env()?;
        Self::new(config)
    }

    /// Set the model to use for generation
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.config.model_id = model_id.into();
        self
    }

    /// Apply a model override if one is given, keeping the configured model otherwise
    pub fn with_model_override(self, model_id: Option<&str>) -> Self {
        match model_id {
            Some(model_id) => self.with_model(model_id),
            None => self,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.access_token.is_some()
    }

    /// Exchange the API key for an IAM access token
    pub async fn connect(&mut self) -> Result<()> {
        let token_request = TokenRequest {
            grant_type: "urn:ibm:params:oauth:grant-type:apikey".to_string(),
            apikey: self.config.api_key.clone(),
        };

        let url = format!("https://{}/identity/token", self.config.iam_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&token_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Authentication(format!(
                "Authentication failed: {}",
                response.status()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        self.access_token = Some(token_response.access_token);
        info!(model = %self.config.model_id, "connected to WatsonX");

        Ok(())
    }

    fn request_body(&self, prompt: &str, config: &GenerationConfig) -> GenerationRequest {
        let sampling = !config.is_deterministic();
        GenerationRequest {
            input: prompt.to_string(),
            parameters: GenerationParams {
                decoding_method: if sampling { "sample" } else { "greedy" },
                max_new_tokens: config.max_new_tokens,
                min_new_tokens: config.min_new_tokens,
                temperature: config.temperature.filter(|_| sampling),
                top_k: config.top_k.filter(|_| sampling),
                top_p: config.top_p.filter(|_| sampling),
                repetition_penalty: config.repetition_penalty,
                stop_sequences: config.stop_sequences.clone(),
            },
            model_id: self.config.model_id.clone(),
            project_id: self.config.project_id.clone(),
        }
    }

    /// Run one streamed generation, forwarding fragments to `sink` if given
    ///
    /// Returns the concatenated text and the last reported token count.
    async fn run_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        sink: Option<&FragmentSink>,
    ) -> Result<(String, Option<u32>)> {
        let access_token = self.access_token.as_ref().ok_or_else(|| {
            Error::Authentication("Not authenticated. Call connect() first.".to_string())
        })?;

        let url = format!(
            "{}/ml/v1/text/generation_stream?version={}",
            self.config.api_url, API_VERSION
        );

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&self.request_body(prompt, config))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Model(format!(
                "WatsonX API request failed with status {}: {}",
                status, error_text
            )));
        }

        forward_events(response.bytes_stream(), sink).await
    }
}

/// Decode a generation event stream, forwarding text to `sink` if given
///
/// Returns the concatenated text and the last reported token count. A stream
/// that produces no text is a model error in both generation modes.
async fn forward_events<S, B, E>(
    body: S,
    sink: Option<&FragmentSink>,
) -> Result<(String, Option<u32>)>
where
    S: futures::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    let mut text = String::new();
    let mut tokens = None;
    let mut consumer_gone = false;

    loop {
        let (events, finished) = match body.next().await {
            Some(chunk) => {
                let chunk = chunk.map_err(|e| Error::Network(e.to_string()))?;
                (decoder.push(chunk.as_ref())?, false)
            }
            None => (decoder.finish()?.into_iter().collect(), true),
        };

        for event in events {
            if event.token_count.is_some() {
                tokens = event.token_count;
            }
            if event.text.is_empty() {
                continue;
            }
            text.push_str(&event.text);

            if let Some(sink) = sink {
                if !consumer_gone && !sink.send(event.text).await {
                    debug!("stream consumer went away");
                    consumer_gone = true;
                }
            }
        }

        if finished {
            break;
        }
    }

    if text.trim().is_empty() {
        return Err(Error::Model("Empty response from WatsonX API".to_string()));
    }
    Ok((text, tokens))
}

#[async_trait]
impl LLMProvider for WatsonxClient {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<GenerationResult> {
        let (text, tokens_generated) = self.run_stream(prompt, config, None).await?;

        Ok(GenerationResult {
            text,
            model_id: self.config.model_id.clone(),
            tokens_generated,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        sink: FragmentSink,
    ) -> Result<()> {
        let (text, tokens) = self.run_stream(prompt, config, Some(&sink)).await?;
        debug!(chars = text.len(), tokens = ?tokens, "streamed generation finished");
        Ok(())
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}
