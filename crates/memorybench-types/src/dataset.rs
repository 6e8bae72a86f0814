//! Benchmark dataset model: questions and the conversation haystack each
//! question is answered from.

use serde::{Deserialize, Serialize};

use crate::state::QuestionId;

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// One conversation session in a question's haystack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Session rendered as `role: content` lines.
    #[must_use]
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One benchmark question with its ground truth and haystack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: QuestionId,
    pub question: String,
    #[serde(default = "default_question_type")]
    pub question_type: String,
    /// Ground-truth answer.
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_date: Option<String>,
    #[serde(default)]
    pub haystack_sessions: Vec<Session>,
    /// Sessions that contain the evidence for the answer.
    #[serde(default)]
    pub answer_session_ids: Vec<String>,
}

fn default_question_type() -> String {
    "default".to_string()
}
