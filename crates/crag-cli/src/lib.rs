//! Terminal interface for complaint RAG

mod history;
pub mod logging;
mod ui;


pub use history::{ConversationHistory, DEFAULT_MAX_TURNS, Turn};
pub use ui::{
    display_banner, format_sources, handle_input_with_history, print_answer, print_help,
    print_not_ready, print_report_summary, print_sources, stream_answer,
};

// Re-export core types
pub use crag_core::{Error, Result};
