// ABOUTME: Offline stub backend — deterministic replies with no model behind them.
// ABOUTME: Useful for trying the client without credentials; token counts are approximate.

use async_trait::async_trait;

use crate::backend::{Backend, BackendError, Conversation, approx_history_tokens};
use crate::session::history::Message;

pub struct StubBackend {
    model: String,
}

impl StubBackend {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Backend for StubBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        _conversation: &Conversation,
        history: &[Message],
        text: &str,
    ) -> Result<String, BackendError> {
        let turn = history.len() / 2 + 1;
        Ok(format!("[{} turn {}] You said: {}", self.model, turn, text))
    }

    async fn count_tokens(
        &self,
        system_instruction: &str,
        history: &[Message],
    ) -> Result<usize, BackendError> {
        Ok(approx_history_tokens(system_instruction, history))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn describe_readiness(&self) -> String {
        format!(
            "stub backend '{}' ready (offline, replies are canned, token counts approximate)",
            self.model
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_echoes_prompt_and_turn() {
        let backend = StubBackend::new("stub");
        let conv = backend.create_conversation("sys", &[], 0).unwrap();
        let history = vec![Message::user("a"), Message::assistant("b")];

        let reply = backend.send(&conv, &history, "ping").await.unwrap();
        assert_eq!(reply, "[stub turn 2] You said: ping");
    }

    #[test]
    fn seeded_conversation_carries_instruction_and_budget() {
        let backend = StubBackend::new("stub");
        let history = vec![Message::user("a"), Message::assistant("b")];
        let conv = backend.create_conversation("be brief", &history, 256).unwrap();
        assert_eq!(conv.system_instruction(), "be brief");
        assert_eq!(conv.budget_hint(), 256);
    }

    #[test]
    fn always_available() {
        let backend = StubBackend::new("stub");
        assert!(backend.is_available());
        assert!(backend.describe_readiness().contains("approximate"));
    }
}
