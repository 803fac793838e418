// ABOUTME: Ollama backend — local model server reached over its /api/chat endpoint.
// ABOUTME: Sends the full history each turn; token counts are approximated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendError, Conversation, approx_history_tokens};
use crate::session::history::{Message, Role};

pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BackendError::Init(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn build_request<'a>(
        &'a self,
        system_instruction: &'a str,
        history: &'a [Message],
        text: &'a str,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !system_instruction.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_instruction,
            });
        }
        messages.extend(history.iter().map(|m| ChatMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.text,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: text,
        });

        ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        conversation: &Conversation,
        history: &[Message],
        text: &str,
    ) -> Result<String, BackendError> {
        let request = self.build_request(conversation.system_instruction(), history, text);
        let url = format!("{}/api/chat", self.base_url);

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::Api {
                provider: "Ollama",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(chat.message.content)
    }

    async fn count_tokens(
        &self,
        system_instruction: &str,
        history: &[Message],
    ) -> Result<usize, BackendError> {
        Ok(approx_history_tokens(system_instruction, history))
    }

    fn is_available(&self) -> bool {
        !self.base_url.is_empty()
    }

    fn describe_readiness(&self) -> String {
        format!(
            "ollama backend '{}' at {} (token counts approximate; is `ollama serve` running?)",
            self.model, self.base_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_includes_system_history_and_prompt() {
        let backend =
            OllamaBackend::new("http://localhost:11434/", "llama3", Duration::from_secs(5))
                .unwrap();
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let request = backend.build_request("be brief", &history, "next");

        let json = serde_json::to_value(&request).unwrap();
        let roles: Vec<&str> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(json["messages"][3]["content"], "next");
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "llama3");
    }

    #[test]
    fn empty_system_instruction_is_omitted() {
        let backend =
            OllamaBackend::new("http://localhost:11434", "llama3", Duration::from_secs(5)).unwrap();
        let request = backend.build_request("", &[], "hi");
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend =
            OllamaBackend::new("http://localhost:11434/", "llama3", Duration::from_secs(5))
                .unwrap();
        assert!(backend.describe_readiness().contains("http://localhost:11434 "));
    }
}
