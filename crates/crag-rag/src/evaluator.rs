//! Batch evaluation over a fixed question set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crag_core::{Error, Query, Result};

use crate::engine::RagEngine;

/// Questions used when no other set is given
pub const DEFAULT_QUESTIONS: [&str; 5] = [
    "What are the common issues reported for Credit cards?",
    "How do customers describe problems with money transfers?",
    "Are there complaints about savings account interest rates?",
    "What are the main sub-products in the Personal Loan category?",
    "Does the data contain any Buy Now Pay Later (BNPL) complaints?",
];

/// Shown in place of a source id that was not retrieved
pub const MISSING_SOURCE: &str = "N/A";

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub question: String,
    pub answer: String,
    /// Record ids of the first two retrieved chunks
    pub sources: Vec<String>,
}

/// One question that could not be answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    pub question: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub model_id: String,
    pub k: usize,
    pub rows: Vec<EvaluationRow>,
    pub failures: Vec<EvaluationFailure>,
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    questions: Vec<String>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTIONS)
    }
}

impl Evaluator {
    pub fn new<Q: Into<String>>(questions: impl IntoIterator<Item = Q>) -> Self {
        Self {
            questions: questions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// Answer every question in order, skipping the ones that fail
    pub async fn run(&self, engine: &RagEngine, k: usize) -> EvaluationReport {
        let mut rows = Vec::new();
        let mut failures = Vec::new();

        for (i, question) in self.questions.iter().enumerate() {
            info!(n = i + 1, of = self.questions.len(), question = %question, "evaluating");

            match engine.answer(&Query::new(question.as_str()).with_k(k)).await {
                Ok(answer) => rows.push(EvaluationRow {
                    question: question.clone(),
                    answer: answer.text.trim().to_string(),
                    sources: answer
                        .sources
                        .record_ids()
                        .into_iter()
                        .take(2)
                        .map(String::from)
                        .collect(),
                }),
                Err(e) => {
                    warn!(question = %question, error = %e, "evaluation question failed");
                    failures.push(EvaluationFailure {
                        question: question.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            answered = rows.len(),
            failed = failures.len(),
            "evaluation complete"
        );

        EvaluationReport {
            generated_at: Utc::now(),
            model_id: engine.model_id().to_string(),
            k,
            rows,
            failures,
        }
    }
}

impl EvaluationRow {
    /// The two source ids, `N/A` where fewer were retrieved
    pub fn source_cell(&self) -> String {
        let source = |i: usize| self.sources.get(i).map_or(MISSING_SOURCE, String::as_str);
        format!("{}, {}", source(0), source(1))
    }
}

impl EvaluationReport {
    /// Render as a Markdown table with blank columns for manual scoring
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# RAG Qualitative Evaluation\n\n");
        let _ = writeln!(
            out,
            "Generated {} with model `{}` (k = {}). {} answered, {} failed.\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC"),
            self.model_id,
            self.k,
            self.rows.len(),
            self.failures.len()
        );

        out.push_str("| Question | Generated Answer | Retrieved Sources | Quality (1-5) | Comments |\n");
        out.push_str("| :--- | :--- | :--- | :---: | :--- |\n");
        for row in &self.rows {
            let _ = writeln!(
                out,
                "| {} | {} | {} | | |",
                escape_cell(&row.question),
                escape_cell(&row.answer),
                row.source_cell()
            );
        }

        if !self.failures.is_empty() {
            out.push_str("\n## Failed questions\n\n");
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "- {}: {}",
                    failure.question,
                    failure.error.replace('\n', " ")
                );
            }
        }

        out
    }

    /// Write the Markdown report, creating parent directories as needed
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Artifact(format!("Cannot create report directory {}: {}", parent.display(), e))
            })?;
        }

        fs::write(path, self.to_markdown()).map_err(|e| {
            Error::Artifact(format!("Cannot write report to {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), "evaluation report written");
        Ok(path.to_path_buf())
    }
}

fn escape_cell(text: &str) -> String {
    text.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalModel;
    use async_trait::async_trait;
    use crag_core::{Chunk, Embedder, FragmentSink, GenerationConfig, GenerationResult, LLMProvider, Record};
    use crag_index::{HashingEmbedder, VectorIndex};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Fails whenever the prompt mentions an "unanswerable" question
    struct SelectiveModel {
        inner: LocalModel,
    }

    #[async_trait]
    impl LLMProvider for SelectiveModel {
        async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<GenerationResult> {
            if prompt.contains("unanswerable") {
                return Err(Error::Model("inference failed".to_string()));
            }
            self.inner.generate(prompt, config).await
        }

        async fn generate_stream(
            &self,
            prompt: &str,
            config: &GenerationConfig,
            sink: FragmentSink,
        ) -> Result<()> {
            self.inner.generate_stream(prompt, config, sink).await
        }

        fn model_id(&self) -> &str {
            "selective"
        }
    }

    fn engine(model: Arc<dyn LLMProvider>) -> RagEngine {
        let embedder = Arc::new(HashingEmbedder::new(128).unwrap());
        let mut index = VectorIndex::new(embedder.fingerprint());
        for (id, category, text) in [
            ("100", "Credit card", "Charged twice for one purchase."),
            ("200", "Money transfers", "The transfer never arrived."),
        ] {
            let record = Record::new(id, category, "", text);
            index
                .insert(Chunk::from_record(&record, text), embedder.embed_one(text).unwrap())
                .unwrap();
        }
        RagEngine::new(Arc::new(index), embedder, model).unwrap()
    }

    fn report() -> EvaluationReport {
        EvaluationReport {
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            model_id: "local-extractive-v1".to_string(),
            k: 5,
            rows: vec![
                EvaluationRow {
                    question: "What are the common issues reported for Credit cards?".to_string(),
                    answer: "Double charges | late fees\nand disputes".to_string(),
                    sources: vec!["100".to_string(), "200".to_string()],
                },
                EvaluationRow {
                    question: "Any BNPL complaints?".to_string(),
                    answer: "One plan.".to_string(),
                    sources: vec!["300".to_string()],
                },
            ],
            failures: vec![EvaluationFailure {
                question: "Broken?".to_string(),
                error: "Model error: inference failed".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_failures_are_skipped_not_fatal() {
        let engine = engine(Arc::new(SelectiveModel {
            inner: LocalModel::new(),
        }));
        let evaluator = Evaluator::new([
            "What goes wrong with credit cards?",
            "an unanswerable question",
            "Do transfers arrive?",
            "another unanswerable one",
            "   ",
        ]);

        let report = evaluator.run(&engine, 2).await;
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(report.rows[0].question, "What goes wrong with credit cards?");
        assert_eq!(report.rows[1].question, "Do transfers arrive?");
        assert_eq!(report.failures[1].question, "another unanswerable one");

        let markdown = report.to_markdown();
        let table_rows = markdown
            .lines()
            .filter(|line| line.starts_with("| ") && !line.starts_with("| Question") && !line.starts_with("| :"))
            .count();
        assert_eq!(table_rows, 2);
    }

    #[tokio::test]
    async fn test_rows_carry_first_two_sources() {
        let engine = engine(Arc::new(LocalModel::new()));
        let report = Evaluator::new(["credit card charged twice"]).run(&engine, 5).await;

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].sources, vec!["100", "200"]);
        assert_eq!(report.model_id, "local-extractive-v1");
    }

    #[test]
    fn test_default_question_set() {
        assert_eq!(Evaluator::default().questions().len(), 5);
    }

    #[test]
    fn test_source_cell_pads_missing_ids() {
        let mut row = report().rows[1].clone();
        assert_eq!(row.source_cell(), "300, N/A");
        row.sources.clear();
        assert_eq!(row.source_cell(), "N/A, N/A");
    }

    #[test]
    fn test_markdown_layout() {
        let markdown = report().to_markdown();
        let expected = "# RAG Qualitative Evaluation\n\n\
            Generated 2024-05-01 12:30 UTC with model `local-extractive-v1` (k = 5). 2 answered, 1 failed.\n\n\
            | Question | Generated Answer | Retrieved Sources | Quality (1-5) | Comments |\n\
            | :--- | :--- | :--- | :---: | :--- |\n\
            | What are the common issues reported for Credit cards? | Double charges \\| late fees<br>and disputes | 100, 200 | | |\n\
            | Any BNPL complaints? | One plan. | 300, N/A | | |\n\
            \n## Failed questions\n\n\
            - Broken?: Model error: inference failed\n";
        assert_eq!(markdown, expected);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("nested").join("evaluation.md");

        let written = report().write_to(&path).unwrap();
        assert_eq!(written, path);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# RAG Qualitative Evaluation"));
    }
}
