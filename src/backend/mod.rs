// ABOUTME: Backend module — the capability contract every inference provider implements.
// ABOUTME: Holds the Backend trait, conversation handles, errors, and the provider factory.

pub mod gemini;
pub mod ollama;
pub mod provider;
pub mod stub;

use async_trait::async_trait;
use uuid::Uuid;

use crate::session::history::Message;

pub use provider::{BackendKind, create_backend};

/// Characters per token used wherever a backend cannot count exactly.
pub const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Approximate token count: characters / 4, rounded up.
///
/// Used by the local backends, which have no tokenizer of their own. The
/// result is only as precise as that fixed ratio.
pub fn approx_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(APPROX_CHARS_PER_TOKEN)
}

/// Approximate tokens across a system instruction and a history.
pub fn approx_history_tokens(system_instruction: &str, history: &[Message]) -> usize {
    approx_token_count(system_instruction)
        + history
            .iter()
            .map(|m| approx_token_count(&m.text))
            .sum::<usize>()
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend initialization failed: {0}")]
    Init(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Handle for one live conversation with a backend.
///
/// The handle carries configuration only. The session owns the history and
/// passes it in on every send, so a fresh handle is cheap and never stale.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    system_instruction: String,
    budget_hint: u32,
}

impl Conversation {
    pub fn new(system_instruction: &str, budget_hint: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_instruction: system_instruction.to_string(),
            budget_hint,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn budget_hint(&self) -> u32 {
        self.budget_hint
    }
}

/// An inference provider.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Model identifier recorded in session files and the transaction log.
    fn model_name(&self) -> &str;

    /// Open a conversation seeded with `initial_history`.
    fn create_conversation(
        &self,
        system_instruction: &str,
        _initial_history: &[Message],
        budget_hint: u32,
    ) -> Result<Conversation, BackendError> {
        Ok(Conversation::new(system_instruction, budget_hint))
    }

    /// Run inference for `text` following `history`, returning only the reply.
    async fn send(
        &self,
        conversation: &Conversation,
        history: &[Message],
        text: &str,
    ) -> Result<String, BackendError>;

    /// Tokens occupied by the system instruction plus `history`.
    async fn count_tokens(
        &self,
        system_instruction: &str,
        history: &[Message],
    ) -> Result<usize, BackendError>;

    fn is_available(&self) -> bool;

    fn describe_readiness(&self) -> String;
}
