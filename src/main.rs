use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crag_cli::{
    ConversationHistory, display_banner, handle_input_with_history, logging, print_answer,
    print_help, print_not_ready, print_report_summary, stream_answer,
};
use crag_core::{Embedder, LLMProvider, Query, RagConfig};
use crag_index::{HashingEmbedder, IndexBuilder, load_records};
use crag_rag::{EngineState, Evaluator, LocalModel, RagEngine};
use crag_watsonx::WatsonxClient;

#[derive(Parser)]
#[command(name = "complaint-rag")]
#[command(about = "Answer questions about consumer complaints with retrieval-augmented generation", long_about = None)]
struct Cli {
    /// Index directory (overrides CRAG_INDEX_PATH)
    #[arg(long, global = true)]
    index_path: Option<PathBuf>,

    /// Generation model
    #[arg(long, value_enum, default_value_t = ModelChoice::Local, global = true)]
    model: ModelChoice,

    /// Embedding model; must match the one the index was built with
    #[arg(long, value_enum, default_value_t = EmbedderChoice::Hashing, global = true)]
    embedder: EmbedderChoice,

    /// JSON file replacing the built-in acronym table (overrides CRAG_ACRONYMS_PATH)
    #[arg(long, global = true)]
    acronyms: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from cleaned complaint records (.csv, .json or .jsonl)
    Index {
        records: PathBuf,
        #[arg(long)]
        sample_size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Number of excerpts to retrieve
        #[arg(short)]
        k: Option<usize>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Interactive session with streamed answers (default)
    Chat {
        #[arg(short)]
        k: Option<usize>,
    },
    /// Run the evaluation questions and write a Markdown report
    Evaluate {
        #[arg(short)]
        k: Option<usize>,
        /// Report path (overrides CRAG_REPORT_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON array of questions replacing the default set
        #[arg(long)]
        questions: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelChoice {
    /// Offline extractive model
    Local,
    /// watsonx.ai text generation (needs WATSONX_API_KEY and WATSONX_PROJECT_ID)
    Watsonx,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderChoice {
    /// Feature-hashing embedder, no download needed
    Hashing,
    /// all-MiniLM-L6-v2 sentence transformer (build with --features fastembed)
    Minilm,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(logging::level_for_verbosity(cli.verbose));

    let mut config = RagConfig::from_env()?;
    if let Some(path) = &cli.index_path {
        config.index_path = path.clone();
    }
    if let Some(path) = &cli.acronyms {
        config.acronyms_path = Some(path.clone());
    }

    match &cli.command {
        Some(Commands::Index {
            records,
            sample_size,
            seed,
            chunk_size,
            chunk_overlap,
        }) => {
            let indexing = &mut config.indexing;
            indexing.sampling.sample_size = sample_size.unwrap_or(indexing.sampling.sample_size);
            indexing.sampling.seed = seed.unwrap_or(indexing.sampling.seed);
            indexing.chunking.chunk_size = chunk_size.unwrap_or(indexing.chunking.chunk_size);
            indexing.chunking.chunk_overlap =
                chunk_overlap.unwrap_or(indexing.chunking.chunk_overlap);
            config.validate()?;

            build_index(&cli, &config, records)
        }
        Some(Commands::Ask {
            question,
            k,
            stream,
        }) => {
            let engine = open_engine(&cli, &config).await?;
            let query = Query::new(question.as_str()).with_k(k.unwrap_or(config.top_k));

            if *stream {
                stream_answer(engine.answer_stream(&query)?).await?;
            } else {
                print_answer(&engine.answer(&query).await?);
            }
            Ok(())
        }
        Some(Commands::Evaluate {
            k,
            output,
            questions,
        }) => {
            let engine = open_engine(&cli, &config).await?;
            let evaluator = match questions {
                Some(path) => {
                    let content = std::fs::read_to_string(path)
                        .with_context(|| format!("reading questions from {}", path.display()))?;
                    let questions: Vec<String> = serde_json::from_str(&content)
                        .with_context(|| format!("parsing questions in {}", path.display()))?;
                    Evaluator::new(questions)
                }
                None => Evaluator::default(),
            };

            let report = evaluator.run(&engine, k.unwrap_or(config.top_k)).await;
            let path = report.write_to(output.as_ref().unwrap_or(&config.report_path))?;
            print_report_summary(&report, &path);
            Ok(())
        }
        Some(Commands::Chat { k }) => {
            let engine = open_engine(&cli, &config).await?;
            chat(&engine, k.unwrap_or(config.top_k)).await
        }
        None => {
            let engine = open_engine(&cli, &config).await?;
            chat(&engine, config.top_k).await
        }
    }
}

fn embedder(choice: EmbedderChoice, config: &RagConfig) -> crag_core::Result<Arc<dyn Embedder>> {
    match choice {
        EmbedderChoice::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.indexing.embedding_dimension,
        )?)),
        #[cfg(feature = "fastembed")]
        EmbedderChoice::Minilm => Ok(Arc::new(crag_index::FastEmbedder::all_minilm_l6_v2()?)),
        #[cfg(not(feature = "fastembed"))]
        EmbedderChoice::Minilm => Err(crag_core::Error::Configuration(
            "the minilm embedder needs a build with `--features fastembed`".to_string(),
        )),
    }
}

async fn generation_model(
    choice: ModelChoice,
    config: &RagConfig,
) -> crag_core::Result<Arc<dyn LLMProvider>> {
    match choice {
        ModelChoice::Local => Ok(Arc::new(LocalModel::new())),
        ModelChoice::Watsonx => {
            let mut client = WatsonxClient::from_env()?
                .with_model_override(config.generation.model_id.as_deref());
            client.connect().await?;
            Ok(Arc::new(client))
        }
    }
}

fn build_index(cli: &Cli, config: &RagConfig, records: &Path) -> Result<()> {
    let records = load_records(records)?;
    let builder = IndexBuilder::with_config(embedder(cli.embedder, config)?, config.indexing.clone());

    println!("{} Building index from {} records...", "🔨".blue(), records.len());
    let report = builder.build(&records, &config.index_path)?;

    println!("{} Index written to {}", "✅".green(), report.index_path);
    println!(
        "   {} sampled of {}, {} without narrative, {} chunks, {} ({} dims)",
        report.records_sampled,
        report.records_total,
        report.records_skipped,
        report.chunks_indexed,
        report.model_id,
        report.dimension
    );
    Ok(())
}

async fn open_engine(cli: &Cli, config: &RagConfig) -> Result<Arc<RagEngine>> {
    let state = EngineState::initialize_with(
        config,
        || embedder(cli.embedder, config),
        || generation_model(cli.model, config),
    )
    .await;

    let engine = match state {
        EngineState::Ready(engine) => engine,
        EngineState::NotReady { reason } => {
            print_not_ready(&reason);
            std::process::exit(1);
        }
    };

    Ok(engine)
}

async fn chat(engine: &RagEngine, k: usize) -> Result<()> {
    display_banner(engine.model_id(), engine.index().len());

    let mut input_history = Vec::new();
    let mut conversation = ConversationHistory::default();

    loop {
        let input = handle_input_with_history(&mut input_history).await?;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => {
                println!("{}", "👋 Goodbye!".green());
                break;
            }
            "help" => {
                print_help();
                continue;
            }
            "clear" => {
                conversation.clear();
                println!("{}", "Conversation cleared.".dimmed());
                continue;
            }
            _ => {}
        }

        let query = Query::new(input)
            .with_k(k)
            .with_history(conversation.render().unwrap_or_default());

        let streaming = match engine.answer_stream(&query) {
            Ok(streaming) => streaming,
            Err(e) => {
                println!("{} {}", "❌".red(), e);
                continue;
            }
        };

        match stream_answer(streaming).await {
            Ok(answer) => conversation.push(input, answer),
            Err(e) => println!("{} Generation failed: {}", "❌".red(), e),
        }
    }

    Ok(())
}
