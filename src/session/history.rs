// ABOUTME: Conversation history types — role-tagged, timestamped messages.
// ABOUTME: Validates that a history alternates user/assistant in complete pairs.

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(with = "millis_timestamp")]
    pub timestamp: NaiveDateTime,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            // Stored with millisecond precision, so keep the in-memory copy identical.
            timestamp: Local::now().naive_local().trunc_subsecs(3),
            text: text.into(),
        }
    }
}

/// Ordered conversation turns, oldest first.
pub type History = Vec<Message>;

/// Why a history read from disk is not a sequence of complete exchanges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryShapeError {
    #[error("history has odd length {0}; the last exchange is incomplete")]
    OddLength(usize),
    #[error("message {index} has role {found}, expected {expected}")]
    OutOfOrder {
        index: usize,
        expected: Role,
        found: Role,
    },
}

/// Check that `history` is empty or strictly alternates user/assistant pairs.
pub fn validate(history: &[Message]) -> Result<(), HistoryShapeError> {
    if history.len() % 2 != 0 {
        return Err(HistoryShapeError::OddLength(history.len()));
    }
    for (index, msg) in history.iter().enumerate() {
        let expected = if index % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        };
        if msg.role != expected {
            return Err(HistoryShapeError::OutOfOrder {
                index,
                expected,
                found: msg.role,
            });
        }
    }
    Ok(())
}

/// Serde adapter for `YYYY-MM-DDTHH:MM:SS.mmm` local timestamps.
mod millis_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
