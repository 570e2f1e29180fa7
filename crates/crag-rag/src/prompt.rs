//! Prompt template and context assembly

use std::fmt::Write as _;

use crag_core::{Error, Prompt, Result, RetrievalResult, ScoredChunk};

pub const HISTORY_SLOT: &str = "{history}";
pub const CONTEXT_SLOT: &str = "{context}";
pub const QUESTION_SLOT: &str = "{question}";

/// Header introducing the context section in the default template
pub const CONTEXT_HEADER: &str = "Context:";
/// Header introducing the question in the default template
pub const QUESTION_HEADER: &str = "Question:";

/// Rendered into the history slot when there is no conversation yet
pub const EMPTY_HISTORY: &str = "(none)";
/// Rendered into the context slot when retrieval found nothing
pub const EMPTY_CONTEXT: &str = "(no matching complaints found)";

/// Disclaimer the model must lead with when answering without evidence
pub const NO_MATCH_DISCLAIMER: &str =
    "No matching complaint was found in the indexed data, so this answer is based on general knowledge.";

/// What the model is told to do when the context cannot answer the question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsufficientContextPolicy {
    /// Say the information is insufficient
    StateInsufficient,
    /// Answer from general domain knowledge, prefixed with a disclaimer
    GeneralKnowledgeWithDisclaimer,
}

/// Policy baked into the default template
pub const INSUFFICIENT_CONTEXT_POLICY: InsufficientContextPolicy =
    InsufficientContextPolicy::GeneralKnowledgeWithDisclaimer;

impl InsufficientContextPolicy {
    pub fn instruction(self) -> String {
        match self {
            Self::StateInsufficient => "If the context does not contain the answer, state that \
                                        you don't have enough information."
                .to_string(),
            Self::GeneralKnowledgeWithDisclaimer => format!(
                "If the context does not contain the answer, answer from general consumer \
                 finance knowledge and begin with this exact sentence: \"{}\"",
                NO_MATCH_DISCLAIMER
            ),
        }
    }
}

/// Template with history, context and question slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Create a template; it must contain each of the three slots
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let missing: Vec<&str> = [HISTORY_SLOT, CONTEXT_SLOT, QUESTION_SLOT]
            .into_iter()
            .filter(|slot| !template.contains(slot))
            .collect();

        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "Prompt template is missing slot(s): {}",
                missing.join(", ")
            )));
        }
        Ok(Self { template })
    }

    /// The CrediTrust analyst template with the given degradation policy
    pub fn for_policy(policy: InsufficientContextPolicy) -> Self {
        let template = format!(
            "You are a financial analyst assistant for CrediTrust. Your task is to answer \
             questions about customer complaints.\n\
             Use the retrieved complaint excerpts below to formulate your answer, and cite \
             the complaint ids of the snippets you rely on.\n\
             {instruction}\n\n\
             Conversation so far:\n{history}\n\n\
             {context_header}\n{context}\n\n\
             {question_header} {question}\n\n\
             Answer:",
            instruction = policy.instruction(),
            history = HISTORY_SLOT,
            context_header = CONTEXT_HEADER,
            context = CONTEXT_SLOT,
            question_header = QUESTION_HEADER,
            question = QUESTION_SLOT,
        );
        Self { template }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill the template for one request
    ///
    /// `question` is the user's original wording, not the expanded query.
    pub fn assemble(
        &self,
        history: Option<&str>,
        retrieval: &RetrievalResult,
        question: &str,
    ) -> Prompt {
        let history = history
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(EMPTY_HISTORY);

        let context = build_context(&retrieval.chunks);
        let context = if context.is_empty() {
            EMPTY_CONTEXT
        } else {
            context.as_str()
        };

        Prompt {
            text: fill_slots(
                &self.template,
                &[
                    (HISTORY_SLOT, history),
                    (CONTEXT_SLOT, context),
                    (QUESTION_SLOT, question.trim()),
                ],
            ),
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_policy(INSUFFICIENT_CONTEXT_POLICY)
    }
}

/// Concatenate retrieved chunks in rank order, each under a citation label
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    let mut context = String::new();

    for (i, hit) in chunks.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }

        let chunk = &hit.chunk;
        let category = match (chunk.category.is_empty(), chunk.sub_category.is_empty()) {
            (true, _) => "uncategorised".to_string(),
            (false, true) => chunk.category.clone(),
            (false, false) => format!("{} / {}", chunk.category, chunk.sub_category),
        };
        let _ = write!(
            context,
            "Snippet {} (complaint {}, {}):\n{}",
            i + 1,
            chunk.record_id,
            category,
            chunk.text
        );
    }

    context
}

/// Substitute slots in a single left-to-right pass, so slot markers inside
/// the substituted values are left alone
fn fill_slots(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while !rest.is_empty() {
        for (slot, value) in values {
            if let Some(after) = rest.strip_prefix(slot) {
                output.push_str(value);
                rest = after;
                continue 'scan;
            }
        }

        let next = rest.chars().next().map_or(rest.len(), char::len_utf8);
        output.push_str(&rest[..next]);
        rest = &rest[next..];
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crag_core::Chunk;

    fn hit(id: &str, category: &str, sub: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                record_id: id.to_string(),
                category: category.to_string(),
                sub_category: sub.to_string(),
            },
            score: 0.5,
        }
    }

    fn retrieval(chunks: Vec<ScoredChunk>) -> RetrievalResult {
        RetrievalResult {
            question: "q".to_string(),
            expanded_query: "q".to_string(),
            chunks,
        }
    }

    #[test]
    fn test_template_requires_all_slots() {
        assert!(PromptTemplate::new("{history} {context} {question}").is_ok());
        let err = PromptTemplate::new("{context} {question}").unwrap_err();
        assert!(err.to_string().contains("{history}"));
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_default_template_is_valid() {
        let template = PromptTemplate::default();
        assert!(PromptTemplate::new(template.as_str()).is_ok());
        assert!(template.as_str().contains(NO_MATCH_DISCLAIMER));
        assert!(template.as_str().contains("CrediTrust"));
    }

    #[test]
    fn test_policy_changes_instruction() {
        let strict = PromptTemplate::for_policy(InsufficientContextPolicy::StateInsufficient);
        assert!(strict.as_str().contains("enough information"));
        assert!(!strict.as_str().contains(NO_MATCH_DISCLAIMER));
    }

    #[test]
    fn test_context_labels_in_rank_order() {
        let context = build_context(&[
            hit("42", "Credit card", "Store credit card", "charged twice"),
            hit("7", "Savings account", "", "rate too low"),
            hit("9", "", "", "no product given"),
        ]);

        assert_eq!(
            context,
            "Snippet 1 (complaint 42, Credit card / Store credit card):\ncharged twice\n\n\
             Snippet 2 (complaint 7, Savings account):\nrate too low\n\n\
             Snippet 3 (complaint 9, uncategorised):\nno product given"
        );
    }

    #[test]
    fn test_assemble_fills_every_slot() {
        let template = PromptTemplate::new("H[{history}] C[{context}] Q[{question}]").unwrap();
        let prompt = template.assemble(
            Some("User: hi"),
            &retrieval(vec![hit("1", "Credit card", "", "late fee")]),
            "  Why the fee? ",
        );
        assert_eq!(
            prompt.as_str(),
            "H[User: hi] C[Snippet 1 (complaint 1, Credit card):\nlate fee] Q[Why the fee?]"
        );
    }

    #[test]
    fn test_assemble_with_nothing_retrieved() {
        let template = PromptTemplate::new("H[{history}] C[{context}] Q[{question}]").unwrap();
        let prompt = template.assemble(None, &retrieval(Vec::new()), "anything?");
        assert_eq!(
            prompt.as_str(),
            "H[(none)] C[(no matching complaints found)] Q[anything?]"
        );

        let prompt = template.assemble(Some("   "), &retrieval(Vec::new()), "anything?");
        assert!(prompt.as_str().starts_with("H[(none)]"));
    }

    #[test]
    fn test_slot_markers_in_values_are_not_expanded() {
        let template = PromptTemplate::new("{history}|{context}|{question}").unwrap();
        let prompt = template.assemble(
            Some("said {question}"),
            &retrieval(vec![hit("1", "Credit card", "", "literal {history}")]),
            "q",
        );
        assert_eq!(
            prompt.as_str(),
            "said {question}|Snippet 1 (complaint 1, Credit card):\nliteral {history}|q"
        );
    }
}
