//! Bounded conversation history for the chat loop

use serde::Serialize;
use std::collections::VecDeque;

/// Number of past exchanges passed back to the model
pub const DEFAULT_MAX_TURNS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// The most recent question/answer pairs of a chat session
///
/// Older turns are dropped once `max_turns` is reached, which keeps prompts
/// from growing without bound over a long session.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.max_turns == 0 {
            return;
        }
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render as `User:`/`Assistant:` lines, or `None` when empty
    pub fn render(&self) -> Option<String> {
        if self.turns.is_empty() {
            return None;
        }

        let lines: Vec<String> = self
            .turns
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}", turn.question.trim(), turn.answer.trim()))
            .collect();
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_recent_turns() {
        let mut history = ConversationHistory::new(2);
        history.push("q1", "a1");
        history.push("q2", "a2");
        history.push("q3", "a3");

        assert_eq!(history.len(), 2);
        assert_eq!(
            history.render().unwrap(),
            "User: q2\nAssistant: a2\nUser: q3\nAssistant: a3"
        );
    }

    #[test]
    fn test_empty_history_renders_nothing() {
        let mut history = ConversationHistory::default();
        assert!(history.render().is_none());

        history.push("q", "a");
        history.clear();
        assert!(history.is_empty());
        assert!(history.render().is_none());
    }

    #[test]
    fn test_zero_turns_disables_history() {
        let mut history = ConversationHistory::new(0);
        history.push("q", "a");
        assert!(history.is_empty());
    }
}
