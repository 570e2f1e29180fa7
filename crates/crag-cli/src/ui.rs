//! UI utilities for the CLI

use colored::*;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, size},
};
use futures::StreamExt;
use std::io::{self, IsTerminal, Write};

use crag_core::{Answer, Result, RetrievalResult};
use crag_rag::{EvaluationReport, StreamingAnswer};

const PROMPT: &str = "crag>";
const PREVIEW_CHARS: usize = 120;

/// Display startup banner
pub fn display_banner(model_id: &str, chunks: usize) {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = terminal_width.saturating_sub(4).clamp(40, 67);
    let inner = banner_width - 2;

    let top_border = format!("┌{}┐", "─".repeat(inner));
    let bottom_border = format!("└{}┘", "─".repeat(inner));
    let empty_line = format!("│{}│", " ".repeat(inner));
    let boxed = |text: &str| {
        let width = text.chars().count();
        format!("│  {}{}│", text, " ".repeat(inner.saturating_sub(width + 2)))
    };

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());
    println!("{}", boxed("CrediTrust Complaint Assistant").blue().bold());
    println!("{}", empty_line.blue());
    println!("{}", boxed("Ask questions about customer complaints.").blue());
    println!("{}", boxed("Answers cite the complaints they are based on.").blue());
    println!("{}", empty_line.blue());
    println!("{}", boxed(&format!("{} indexed excerpts", chunks)).blue());
    println!("{}", boxed(&format!("model: {}", model_id)).dimmed());
    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
    println!(
        "{}",
        "💡 Tip: Ask in plain language, or type 'help' for commands".dimmed()
    );
    println!();
}

/// Read one line, with ↑/↓ navigation through earlier questions
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<String> {
    // Piped input: no raw mode, read the line as is
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        let read = io::stdin().read_line(&mut input)?;
        if read == 0 {
            return Ok("exit".to_string());
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(input);
    }

    enable_raw_mode()?;
    let result = read_line_raw(history);
    disable_raw_mode()?;
    println!();

    let input = result?;
    if !input.trim().is_empty() {
        history.push(input.clone());
    }
    Ok(input)
}

fn read_line_raw(history: &[String]) -> Result<String> {
    let mut input = String::new();
    let mut history_index: Option<usize> = None;

    redraw(&input, 0)?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        let previous_width = input.chars().count();
        match key_event.code {
            KeyCode::Enter => return Ok(input),
            KeyCode::Esc => return Ok(String::new()),
            KeyCode::Char(c) => input.push(c),
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Up if !history.is_empty() => {
                let new_index = match history_index {
                    None => history.len() - 1,
                    Some(idx) => idx.saturating_sub(1),
                };
                history_index = Some(new_index);
                input = history[new_index].clone();
            }
            KeyCode::Down => match history_index {
                Some(idx) if idx + 1 < history.len() => {
                    history_index = Some(idx + 1);
                    input = history[idx + 1].clone();
                }
                Some(_) => {
                    history_index = None;
                    input.clear();
                }
                None => {}
            },
            _ => continue,
        }
        redraw(&input, previous_width)?;
    }
}

fn redraw(input: &str, previous_width: usize) -> Result<()> {
    let padding = previous_width.saturating_sub(input.chars().count());
    print!(
        "\r{} {}{}\r{} {}",
        PROMPT.green().bold(),
        input,
        " ".repeat(padding),
        PROMPT.green().bold(),
        input
    );
    io::stdout().flush()?;
    Ok(())
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Ask a question about the complaints", "<question>".green());
    println!("  {} - Forget the conversation so far", "clear".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Exit the application", "exit/quit".green());
    println!();
    println!("{}", "Examples:".bold());
    println!("  What are the common issues reported for Credit cards?");
    println!("  Does the data contain any BNPL complaints?");
}

/// One line per retrieved chunk: rank, record id, category and a preview
pub fn format_sources(sources: &RetrievalResult) -> Vec<String> {
    sources
        .chunks
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let chunk = &hit.chunk;
            let category = if chunk.sub_category.is_empty() {
                chunk.category.clone()
            } else {
                format!("{} / {}", chunk.category, chunk.sub_category)
            };
            format!(
                "[{}] complaint {} ({}): {}",
                i + 1,
                chunk.record_id,
                category,
                preview(&chunk.text)
            )
        })
        .collect()
}

/// Print the retrieved sources ahead of the answer
pub fn print_sources(sources: &RetrievalResult) {
    if sources.is_empty() {
        println!("{}", "No matching complaints found.".yellow());
        return;
    }

    println!("{} {}", "📚".cyan(), "Sources".bold());
    for line in format_sources(sources) {
        println!("  {}", line.dimmed());
    }
    println!();
}

pub fn print_answer(answer: &Answer) {
    print_sources(&answer.sources);
    println!("{} {}", "💬".green(), answer.text.trim());
    println!();
}

/// Show sources, then print fragments as they arrive; returns the full text
///
/// A generation error ends the answer early and is returned after the
/// partial text has been printed.
pub async fn stream_answer(answer: StreamingAnswer) -> Result<String> {
    let StreamingAnswer { sources, mut stream } = answer;
    print_sources(&sources);

    print!("{} ", "💬".green());
    io::stdout().flush()?;

    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(fragment) => {
                print!("{}", fragment);
                io::stdout().flush()?;
                text.push_str(&fragment);
            }
            Err(e) => {
                println!();
                return Err(e);
            }
        }
    }
    println!();
    println!();
    Ok(text)
}

pub fn print_report_summary(report: &EvaluationReport, path: &std::path::Path) {
    println!(
        "{} Evaluated {} question(s): {} answered, {} failed",
        "📋".cyan(),
        report.rows.len() + report.failures.len(),
        report.rows.len().to_string().green(),
        report.failures.len().to_string().red()
    );
    for failure in &report.failures {
        println!("  {} {}: {}", "❌".red(), failure.question, failure.error.dimmed());
    }
    println!("{} Report written to {}", "✅".green(), path.display());
}

/// Explain why questions cannot be answered yet
pub fn print_not_ready(reason: &str) {
    eprintln!("{} {}", "⚠️".yellow(), "The complaint index is not available.".yellow().bold());
    eprintln!("   {}", reason.dimmed());
    eprintln!(
        "   {}",
        "Build it first with: complaint-rag index <records.jsonl>".dimmed()
    );
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_characters() {
        assert_eq!(preview("short\n text"), "short text");

        let long = "é".repeat(200);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
    }
}
