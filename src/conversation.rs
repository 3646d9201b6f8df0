//! Conversation memory for one chat session.
//!
//! The conversation is owned by its session and is never shared between
//! sessions. Each completed question/answer exchange is one [`Turn`].

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered list of turns, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Prompt rendering of the prior turns.
    pub fn history(&self) -> String {
        format_history(&self.turns)
    }

    /// Markdown transcript for saving a chat to disk.
    pub fn to_markdown(&self, document: Option<&str>) -> String {
        let mut out = String::from("# Chat transcript\n\n");
        if let Some(doc) = document {
            out.push_str(&format!("Document: `{}`\n\n", doc));
        }
        for turn in &self.turns {
            out.push_str(&format!(
                "**You** ({}):\n\n{}\n\n**Assistant:**\n\n{}\n\n---\n\n",
                turn.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                turn.question,
                turn.answer
            ));
        }
        out
    }
}

/// Render turns as `User: …` / `AI: …` lines, one pair per turn.
pub fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAI: {}\n", t.question, t.answer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_lists_turns_in_order() {
        let mut conv = Conversation::new();
        assert_eq!(conv.history(), "");
        conv.push(Turn::new("What is the rent?", "$1,000."));
        conv.push(Turn::new("Due when?", "Monthly."));
        assert_eq!(
            conv.history(),
            "User: What is the rent?\nAI: $1,000.\nUser: Due when?\nAI: Monthly.\n"
        );
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn test_clear_empties() {
        let mut conv = Conversation::new();
        conv.push(Turn::new("q", "a"));
        conv.clear();
        assert!(conv.is_empty());
    }

    #[test]
    fn test_markdown_transcript_contains_turns() {
        let mut conv = Conversation::new();
        conv.push(Turn::new("Who pays tax?", "The buyer."));
        let md = conv.to_markdown(Some("deed.pdf"));
        assert!(md.starts_with("# Chat transcript"));
        assert!(md.contains("`deed.pdf`"));
        assert!(md.contains("Who pays tax?"));
        assert!(md.contains("The buyer."));
    }
}
