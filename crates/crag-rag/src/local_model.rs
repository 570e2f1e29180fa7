//! Offline extractive generation model

use async_trait::async_trait;
use tracing::debug;

use crag_core::{FragmentSink, GenerationConfig, GenerationResult, LLMProvider, Result};

use crate::prompt::{CONTEXT_HEADER, EMPTY_CONTEXT, NO_MATCH_DISCLAIMER, QUESTION_HEADER};

pub const LOCAL_MODEL_ID: &str = "local-extractive-v1";

const ANSWER_LEAD: &str = "Based on the retrieved complaints:";
const GENERAL_ADVICE: &str = "Customers with this kind of problem usually contact their provider \
                              first and escalate to the CFPB if the issue is not resolved.";

/// Deterministic model that answers by quoting the prompt's context
///
/// The answer is the first sentence of every retrieved snippet, emitted one
/// word at a time. It needs no network or model weights, and its blocking
/// output is exactly the concatenation of its streamed fragments.
#[derive(Debug, Clone, Default)]
pub struct LocalModel;

impl LocalModel {
    pub fn new() -> Self {
        Self
    }

    /// The fragments this model produces for `prompt`, in order
    pub fn fragments(&self, prompt: &str, config: &GenerationConfig) -> Vec<String> {
        let snippets = context_snippets(prompt);
        let floor = config.min_new_tokens as usize;

        let words: Vec<&str> = if snippets.is_empty() {
            NO_MATCH_DISCLAIMER
                .split_whitespace()
                .chain(GENERAL_ADVICE.split_whitespace())
                .collect()
        } else {
            let mut leads: Vec<&str> = Vec::new();
            let mut remainder: Vec<&str> = Vec::new();
            for body in &snippets {
                let (lead, tail) = split_first_sentence(body);
                if !leads.contains(&lead) {
                    leads.push(lead);
                }
                remainder.extend(tail.split_whitespace());
            }

            let mut words: Vec<&str> = ANSWER_LEAD.split_whitespace().collect();
            words.extend(leads.iter().flat_map(|lead| lead.split_whitespace()));

            let mut extra = remainder.into_iter();
            while words.len() < floor {
                match extra.next() {
                    Some(word) => words.push(word),
                    None => break,
                }
            }
            words
        };

        let budget = config.max_new_tokens as usize;
        let mut fragments = Vec::new();
        for word in words {
            if fragments.len() >= budget {
                break;
            }
            let stops = config
                .stop_sequences
                .iter()
                .any(|stop| !stop.is_empty() && word.contains(stop.as_str()));
            if stops && fragments.len() >= floor {
                break;
            }

            if fragments.is_empty() {
                fragments.push(word.to_string());
            } else {
                fragments.push(format!(" {}", word));
            }
        }
        fragments
    }
}

#[async_trait]
impl LLMProvider for LocalModel {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<GenerationResult> {
        let fragments = self.fragments(prompt, config);
        Ok(GenerationResult {
            tokens_generated: Some(fragments.len() as u32),
            text: fragments.concat(),
            model_id: LOCAL_MODEL_ID.to_string(),
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        sink: FragmentSink,
    ) -> Result<()> {
        for fragment in self.fragments(prompt, config) {
            if !sink.send(fragment).await {
                debug!("stream consumer went away");
                break;
            }
        }
        Ok(())
    }

    fn model_id(&self) -> &str {
        LOCAL_MODEL_ID
    }
}

/// Snippet bodies from the context section of a prompt
fn context_snippets(prompt: &str) -> Vec<String> {
    let mut in_context = false;
    let mut snippets: Vec<String> = Vec::new();

    for line in prompt.lines() {
        let line = line.trim();
        if !in_context {
            in_context = line == CONTEXT_HEADER;
            continue;
        }
        if line.starts_with(QUESTION_HEADER) {
            break;
        }
        if line.is_empty() || line == EMPTY_CONTEXT {
            continue;
        }
        if line.starts_with("Snippet ") && line.ends_with(':') {
            snippets.push(String::new());
            continue;
        }

        match snippets.last_mut() {
            Some(body) => {
                if !body.is_empty() {
                    body.push(' ');
                }
                body.push_str(line);
            }
            None => snippets.push(line.to_string()),
        }
    }

    snippets.retain(|body| !body.is_empty());
    snippets
}

fn split_first_sentence(text: &str) -> (&str, &str) {
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_none_or(char::is_whitespace)
        })
        .map_or(text.len(), |(i, c)| i + c.len_utf8());
    (text[..end].trim(), text[end..].trim())
}
