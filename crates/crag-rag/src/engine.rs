//! Query-time RAG engine

use std::sync::Arc;
use tracing::{debug, info, warn};

use crag_core::{
    Answer, Embedder, Error, GenerationConfig, LLMProvider, Prompt, Query, RagConfig, Result,
    RetrievalResult,
};
use crag_index::VectorIndex;

use crate::expander::{AcronymTable, QueryExpander};
use crate::generator::{DEFAULT_STREAM_CAPACITY, GenerationStream, generate_blocking, spawn_stream};
use crate::prompt::PromptTemplate;
use crate::retriever::Retriever;

/// Sources retrieved for a question together with the pending answer text
///
/// `sources` is complete before any text is generated, so a caller can show
/// what was retrieved while the answer is still streaming.
pub struct StreamingAnswer {
    pub sources: RetrievalResult,
    pub stream: GenerationStream,
}

/// Everything needed to answer questions, assembled once at startup
///
/// The engine holds no per-request state: it can be shared behind an `Arc`
/// and queried concurrently.
pub struct RagEngine {
    retriever: Retriever,
    model: Arc<dyn LLMProvider>,
    expander: QueryExpander,
    template: PromptTemplate,
    generation: GenerationConfig,
    stream_capacity: usize,
}

impl RagEngine {
    /// Create an engine over an already loaded index
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        Ok(Self {
            retriever: Retriever::new(index, embedder)?,
            model,
            expander: QueryExpander::default(),
            template: PromptTemplate::default(),
            generation: GenerationConfig::default(),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        })
    }

    /// Load the index at `config.index_path` and build an engine over it
    pub fn open(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        let index = VectorIndex::load(&config.index_path, &embedder.fingerprint())?;
        info!(
            path = %config.index_path.display(),
            chunks = index.len(),
            model = model.model_id(),
            "RAG engine ready"
        );

        let mut engine = Self::new(Arc::new(index), embedder, model)?
            .with_generation_config(config.generation.clone())
            .with_stream_capacity(config.stream_capacity);

        if let Some(path) = &config.acronyms_path {
            let table = AcronymTable::from_json_file(path)?;
            info!(path = %path.display(), acronyms = table.len(), "acronym table loaded");
            engine = engine.with_expander(QueryExpander::new(table));
        }
        Ok(engine)
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    pub fn index(&self) -> &VectorIndex {
        self.retriever.index()
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Expand the question and fetch its nearest chunks
    pub fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        if query.question.trim().is_empty() {
            return Err(Error::InvalidInput("question is empty".to_string()));
        }

        let expanded_query = self.expander.expand(&query.question);
        if expanded_query != query.question.trim() {
            debug!(expanded = %expanded_query, "query expanded");
        }

        let chunks = self.retriever.retrieve(&expanded_query, query.k)?;
        if chunks.len() < query.k {
            debug!(requested = query.k, returned = chunks.len(), "index smaller than k");
        }

        Ok(RetrievalResult {
            question: query.question.clone(),
            expanded_query,
            chunks,
        })
    }

    /// The prompt that would be sent to the model for `query`
    pub fn prompt_for(&self, query: &Query, retrieval: &RetrievalResult) -> Prompt {
        self.template
            .assemble(query.history.as_deref(), retrieval, &query.question)
    }

    /// Answer a question in one piece
    pub async fn answer(&self, query: &Query) -> Result<Answer> {
        let sources = self.retrieve(query)?;
        let prompt = self.prompt_for(query, &sources);
        let result = generate_blocking(self.model.as_ref(), &prompt, &self.generation).await?;

        Ok(Answer {
            text: result.text,
            sources,
        })
    }

    /// Retrieve sources now and stream the answer as it is generated
    ///
    /// Retrieval errors are returned directly; generation errors arrive
    /// through the stream.
    pub fn answer_stream(&self, query: &Query) -> Result<StreamingAnswer> {
        let sources = self.retrieve(query)?;
        let prompt = self.prompt_for(query, &sources);
        let stream = spawn_stream(
            self.model.clone(),
            prompt,
            self.generation.clone(),
            self.stream_capacity,
        );

        Ok(StreamingAnswer { sources, stream })
    }
}

/// Whether the engine could be built
///
/// Startup never fails outright: a missing or incompatible index leaves the
/// application running in an explicit not-ready state that explains why.
pub enum EngineState {
    Ready(Arc<RagEngine>),
    NotReady { reason: String },
}

impl EngineState {
    pub fn initialize(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LLMProvider>,
    ) -> Self {
        Self::from_open(RagEngine::open(config, embedder, model))
    }

    /// Construct the embedder and model, then open the engine
    ///
    /// A failure in either constructor, such as missing credentials or an
    /// unreachable model service, leaves the state not ready.
    pub async fn initialize_with<E, M, Fut>(config: &RagConfig, embedder: E, model: M) -> Self
    where
        E: FnOnce() -> Result<Arc<dyn Embedder>>,
        M: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn LLMProvider>>>,
    {
        let opened = async {
            let embedder = embedder()?;
            let model = model().await?;
            RagEngine::open(config, embedder, model)
        };
        Self::from_open(opened.await)
    }

    fn from_open(opened: Result<RagEngine>) -> Self {
        match opened {
            Ok(engine) => Self::Ready(Arc::new(engine)),
            Err(e) => {
                warn!(error = %e, "RAG engine is not ready");
                Self::NotReady {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The engine, or an artifact error carrying the not-ready reason
    pub fn engine(&self) -> Result<Arc<RagEngine>> {
        match self {
            Self::Ready(engine) => Ok(engine.clone()),
            Self::NotReady { reason } => Err(Error::Artifact(format!(
                "RAG engine is not ready: {}",
                reason
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalModel;
    use crag_core::{Chunk, Record};
    use crag_index::HashingEmbedder;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn engine() -> RagEngine {
        let embedder = Arc::new(HashingEmbedder::new(384).unwrap());
        let mut index = VectorIndex::new(embedder.fingerprint());
        for (id, category, text) in [
            ("1", "Credit card", "My credit card was charged twice. The bank refused to refund."),
            ("2", "Savings account", "Savings account interest rate is too low."),
            ("3", "Buy Now, Pay Later (BNPL)", "The buy now pay later plan took two payments."),
        ] {
            let record = Record::new(id, category, "", text);
            index
                .insert(Chunk::from_record(&record, text), embedder.embed_one(text).unwrap())
                .unwrap();
        }
        RagEngine::new(Arc::new(index), embedder, Arc::new(LocalModel::new())).unwrap()
    }

    #[test]
    fn test_retrieve_expands_but_keeps_question() {
        let engine = engine();
        let result = engine
            .retrieve(&Query::new("Any BNPL complaints?").with_k(1))
            .unwrap();

        assert_eq!(result.question, "Any BNPL complaints?");
        assert_eq!(result.expanded_query, "Any buy now pay later complaints?");
        assert_eq!(result.record_ids(), vec!["3"]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let engine = engine();
        let result = engine
            .retrieve(&Query::new("complaints").with_k(10))
            .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_blank_question_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.retrieve(&Query::new("   ")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_prompt_uses_original_question_and_history() {
        let engine = engine();
        let query = Query::new("Any BNPL complaints?")
            .with_history("User: hello\nAssistant: hi")
            .with_k(1);
        let retrieval = engine.retrieve(&query).unwrap();
        let prompt = engine.prompt_for(&query, &retrieval);

        assert!(prompt.as_str().contains("Question: Any BNPL complaints?"));
        assert!(prompt.as_str().contains("User: hello\nAssistant: hi"));
        assert!(prompt.as_str().contains("Snippet 1 (complaint 3, Buy Now, Pay Later (BNPL)):"));
    }

    #[tokio::test]
    async fn test_stream_matches_blocking_answer() {
        let engine = engine();
        let query = Query::new("credit card double charge").with_k(2);

        let blocking = engine.answer(&query).await.unwrap();
        let streaming = engine.answer_stream(&query).unwrap();

        assert_eq!(streaming.sources.record_ids(), blocking.sources.record_ids());
        assert_eq!(streaming.sources.record_ids()[0], "1");

        let fragments: Vec<String> = streaming
            .stream
            .map(|fragment| fragment.unwrap())
            .collect()
            .await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), blocking.text);
    }

    #[test]
    fn test_not_ready_when_index_missing() {
        let dir = TempDir::new().unwrap();
        let config = RagConfig {
            index_path: dir.path().join("missing"),
            ..RagConfig::default()
        };

        let state = EngineState::initialize(
            &config,
            Arc::new(HashingEmbedder::new(384).unwrap()),
            Arc::new(LocalModel::new()),
        );
        assert!(!state.is_ready());
        assert!(matches!(state.engine(), Err(Error::Artifact(_))));
        match state {
            EngineState::NotReady { reason } => assert!(reason.contains("Index not found")),
            EngineState::Ready(_) => panic!("engine should not be ready"),
        }
    }

    #[tokio::test]
    async fn test_model_construction_failure_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let config = RagConfig {
            index_path: dir.path().join("missing"),
            ..RagConfig::default()
        };

        let state = EngineState::initialize_with(
            &config,
            || Ok(Arc::new(HashingEmbedder::new(384)?) as Arc<dyn Embedder>),
            || async {
                Err::<Arc<dyn LLMProvider>, _>(Error::Configuration(
                    "WATSONX_API_KEY is not set".to_string(),
                ))
            },
        )
        .await;

        assert!(matches!(state.engine(), Err(Error::Artifact(_))));
        match state {
            EngineState::NotReady { reason } => assert!(reason.contains("WATSONX_API_KEY")),
            EngineState::Ready(_) => panic!("engine should not be ready"),
        }
    }

    #[tokio::test]
    async fn test_embedder_construction_failure_is_not_ready() {
        let config = RagConfig::default();
        let model_built = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = model_built.clone();

        let state = EngineState::initialize_with(
            &config,
            || Err(Error::Configuration("embedder unavailable".to_string())),
            || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(Arc::new(LocalModel::new()) as Arc<dyn LLMProvider>)
            },
        )
        .await;

        assert!(!model_built.load(std::sync::atomic::Ordering::SeqCst));
        match state {
            EngineState::NotReady { reason } => assert!(reason.contains("embedder unavailable")),
            EngineState::Ready(_) => panic!("engine should not be ready"),
        }
    }
}
