//! Conversation assembly
//!
//! Turns a caller-supplied transcript plus the new user message into the
//! message sequence for the completion backend. Pure; every call builds a
//! fresh sequence.

use crate::llm::Message;
use serde::{Deserialize, Serialize};

/// Fixed assistant persona sent as the first message of every request
pub const SYSTEM_PREAMBLE: &str = r#"You are an AI assistant for an Expense Management System. You can help users:
- View expenses (all, by status, pending approval)
- Create new expenses
- Approve expenses
- Get information about expense categories and statuses

Use the available functions to read or change expense data instead of guessing.
Amounts are in GBP. Dates use the YYYY-MM-DD format.
Be helpful, concise, and professional."#;

const USER_PREFIX: &str = "User:";
const ASSISTANT_PREFIX: &str = "Assistant:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One prior turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }

    /// Parse a prefix-tagged history line ("User: ..." / "Assistant: ...").
    /// Lines with neither prefix yield `None` and are dropped by callers.
    pub fn parse_tagged(line: &str) -> Option<Self> {
        if let Some(rest) = line.strip_prefix(USER_PREFIX) {
            Some(Self::user(rest.trim()))
        } else {
            line.strip_prefix(ASSISTANT_PREFIX)
                .map(|rest| Self::assistant(rest.trim()))
        }
    }
}

/// Parse the wire transcript, silently skipping untagged lines
pub fn parse_history<S: AsRef<str>>(lines: &[S]) -> Vec<TranscriptTurn> {
    lines
        .iter()
        .filter_map(|line| TranscriptTurn::parse_tagged(line.as_ref()))
        .collect()
}

/// Build the message sequence: system preamble, transcript, new message
pub fn assemble(transcript: &[TranscriptTurn], user_message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len() + 2);
    messages.push(Message::system(SYSTEM_PREAMBLE));

    messages.extend(transcript.iter().map(|turn| match turn.speaker {
        Speaker::User => Message::user(turn.text.as_str()),
        Speaker::Assistant => Message::assistant(turn.text.as_str()),
    }));

    messages.push(Message::user(user_message));
    messages
}
