// ABOUTME: Session module — one conversation's history, backend handle, and token accounting.
// ABOUTME: Sends write through to the transaction log and the durable store as advisory side effects.

pub mod history;
pub mod log;
pub mod manager;
pub mod persistence;

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{Backend, BackendError, Conversation};
use crate::identity::Identity;
use history::{History, HistoryShapeError, Message};
use log::{WalEntry, WalError, WriteAheadLog};
use persistence::{SessionStore, StoreError};

pub use manager::SessionManager;

/// Context window assumed for every backend when reporting the remaining budget.
pub const CONTEXT_LIMIT: usize = 32_768;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("session '{0}' has no backend conversation; clear or pop to reinitialize")]
    Uninitialized(String),
    #[error("invalid initial history: {0}")]
    InvalidHistory(#[from] HistoryShapeError),
}

impl SessionError {
    /// True when the requested session simply has no file yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::Store(StoreError::NotFound(_)))
    }
}

/// A non-critical side effect that failed while the primary operation succeeded.
#[derive(Debug, thiserror::Error)]
pub enum Advisory {
    #[error("transaction log append failed: {0}")]
    Wal(#[from] WalError),
    #[error("session save failed: {0}")]
    Save(#[from] StoreError),
    #[error("token count failed: {0}")]
    TokenCount(BackendError),
    #[error("backend reinitialization failed: {0}")]
    Reinit(BackendError),
}

/// Token usage of a session against `CONTEXT_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub used: usize,
    pub remaining: usize,
    pub limit: usize,
}

impl TokenUsage {
    pub fn from_used(used: usize) -> Self {
        Self {
            used,
            remaining: CONTEXT_LIMIT.saturating_sub(used),
            limit: CONTEXT_LIMIT,
        }
    }
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokens: {} (remaining {} / {})",
            self.used, self.remaining, self.limit
        )
    }
}

/// Primary outcome plus any advisory failures collected on the way.
#[derive(Debug)]
pub struct Advised<T> {
    pub value: T,
    pub advisories: Vec<Advisory>,
}

impl<T> Advised<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            advisories: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty()
    }

    fn note(&mut self, advisory: Advisory) {
        tracing::warn!(error = %advisory, "advisory side effect failed");
        self.advisories.push(advisory);
    }
}

/// Collaborators shared by every session in a process.
#[derive(Clone)]
pub struct SessionDeps {
    pub backend: Arc<dyn Backend>,
    pub store: SessionStore,
    pub wal: WriteAheadLog,
    pub budget_hint: u32,
}

/// One conversation: the authoritative history and the live backend handle.
pub struct Session {
    id: String,
    identity: Identity,
    history: History,
    conversation: Option<Conversation>,
    deps: SessionDeps,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("messages", &self.history.len())
            .field("conversation", &self.conversation.as_ref().map(|c| c.id()))
            .finish()
    }
}

impl Session {
    /// Start a session, minting an id when none is given.
    pub fn create(
        deps: SessionDeps,
        identity: Identity,
        id: Option<String>,
        initial_history: History,
    ) -> Result<Self, SessionError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        deps.store.session_path(&id)?;
        history::validate(&initial_history)?;

        let conversation = deps.backend.create_conversation(
            &identity.system_role,
            &initial_history,
            deps.budget_hint,
        )?;
        tracing::debug!(session = %id, messages = initial_history.len(), "session created");

        Ok(Self {
            id,
            identity,
            history: initial_history,
            conversation: Some(conversation),
            deps,
        })
    }

    /// Reopen a stored session by id.
    pub fn restore(deps: SessionDeps, identity: Identity, id: &str) -> Result<Self, SessionError> {
        let history = deps.store.load(id)?;
        Self::create(deps, identity, Some(id.to_string()), history)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn model_name(&self) -> &str {
        self.deps.backend.model_name()
    }

    /// Fewer than one complete exchange.
    pub fn is_empty(&self) -> bool {
        self.history.len() < 2
    }

    /// Send one user turn and record the exchange.
    ///
    /// The history only grows once the backend has replied, so a failed send
    /// leaves it untouched. Token counting, the transaction log and the
    /// write-through save are reported as advisories.
    pub async fn send_message(&mut self, text: &str) -> Result<Advised<String>, SessionError> {
        let conversation = self
            .conversation
            .as_ref()
            .ok_or_else(|| SessionError::Uninitialized(self.id.clone()))?;

        let user = Message::user(text);
        let reply = self
            .deps
            .backend
            .send(conversation, &self.history, text)
            .await?;
        self.history.push(user);
        self.history.push(Message::assistant(reply.clone()));

        let mut outcome = Advised::clean(reply);
        let counted = self
            .deps
            .backend
            .count_tokens(&self.identity.system_role, &self.history)
            .await;
        let tokens = match counted {
            Ok(n) => n,
            Err(e) => {
                outcome.note(Advisory::TokenCount(e));
                0
            }
        };

        let entry = WalEntry::now(&self.id, self.model_name(), text, &outcome.value, tokens);
        if let Err(e) = self.deps.wal.append(entry) {
            outcome.note(Advisory::Wal(e));
        }
        if let Err(e) = self.save() {
            outcome.note(Advisory::Save(e));
        }
        Ok(outcome)
    }

    /// Drop the whole history and start a fresh backend conversation.
    pub fn clear_history(&mut self) -> Result<Advised<()>, SessionError> {
        self.history.clear();
        self.reinitialize()?;

        let mut outcome = Advised::clean(());
        if let Err(e) = self.save() {
            outcome.note(Advisory::Save(e));
        }
        Ok(outcome)
    }

    /// Remove the final user/assistant pair. Returns false when there is none.
    pub fn pop_last_exchange(&mut self) -> Advised<bool> {
        if self.history.len() < 2 {
            return Advised::clean(false);
        }
        self.history.truncate(self.history.len() - 2);

        let mut outcome = Advised::clean(true);
        if let Err(e) = self.reinitialize() {
            outcome.note(Advisory::Reinit(e));
        }
        if let Err(e) = self.save() {
            outcome.note(Advisory::Save(e));
        }
        outcome
    }

    /// Replace the backend conversation with one seeded from the current history.
    pub fn reinitialize(&mut self) -> Result<(), BackendError> {
        self.conversation = None;
        let conversation = self.deps.backend.create_conversation(
            &self.identity.system_role,
            &self.history,
            self.deps.budget_hint,
        )?;
        self.conversation = Some(conversation);
        Ok(())
    }

    pub async fn count_tokens(&self) -> Result<usize, SessionError> {
        let count = self
            .deps
            .backend
            .count_tokens(&self.identity.system_role, &self.history)
            .await?;
        Ok(count)
    }

    /// Tokens left in the shared context limit.
    pub async fn remaining_budget(&self) -> Result<usize, SessionError> {
        Ok(self.token_usage().await?.remaining)
    }

    pub async fn token_usage(&self) -> Result<TokenUsage, SessionError> {
        Ok(TokenUsage::from_used(self.count_tokens().await?))
    }

    /// Write the session to the store; incomplete sessions are skipped there.
    pub fn save(&self) -> Result<(), StoreError> {
        self.deps.store.save(
            &self.id,
            &self.history,
            &self.identity.system_role,
            self.model_name(),
        )
    }
}
