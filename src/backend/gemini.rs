// ABOUTME: Gemini backend — Google Generative Language REST API (generateContent, countTokens).
// ABOUTME: Reads the API key from GEMINI_API_KEY or GOOGLE_API_KEY; the budget hint sets the thinking budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{approx_token_count, Backend, BackendError, Conversation};
use crate::session::history::{Message, Role};

pub struct GeminiBackend {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensRequest {
    generate_content_request: CountTokensInner,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensInner {
    model: String,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: usize,
}

impl GeminiBackend {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    /// Build a client. The key is resolved from the environment when not given.
    pub fn new(
        api_key: Option<&str>,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.is_empty());
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BackendError::Init(e.to_string()))?;
        let base_url = if base_url.is_empty() {
            Self::DEFAULT_BASE_URL
        } else {
            base_url.trim_end_matches('/')
        };
        Ok(Self {
            api_key,
            base_url: base_url.to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key.as_deref().ok_or_else(|| {
            BackendError::Unavailable(
                "Gemini API key not found; set GEMINI_API_KEY or GOOGLE_API_KEY".to_string(),
            )
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/{}:{}", self.base_url, self.model_path(), method)
    }

    fn to_contents(history: &[Message]) -> Vec<Content> {
        history
            .iter()
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: Some(m.text.clone()),
                }],
            })
            .collect()
    }

    fn system_content(system_instruction: &str) -> Option<Content> {
        (!system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: Some(system_instruction.to_string()),
            }],
        })
    }

    fn build_request(
        conversation: &Conversation,
        history: &[Message],
        text: &str,
    ) -> GenerateContentRequest {
        let mut contents = Self::to_contents(history);
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        });
        let generation_config = (conversation.budget_hint() > 0).then(|| GenerationConfig {
            thinking_config: ThinkingConfig {
                thinking_budget: conversation.budget_hint(),
            },
        });
        GenerateContentRequest {
            contents,
            system_instruction: Self::system_content(conversation.system_instruction()),
            generation_config,
        }
    }

    async fn post<Req: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &Req,
    ) -> Result<reqwest::Response, BackendError> {
        let key = self.api_key()?;
        let response = self
            .client
            .post(self.endpoint(method))
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::Api {
                provider: "Gemini",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    fn extract_text(response: GenerateContentResponse) -> Result<String, BackendError> {
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(BackendError::Decode(
                "Gemini returned no text candidates".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn create_conversation(
        &self,
        system_instruction: &str,
        _initial_history: &[Message],
        budget_hint: u32,
    ) -> Result<Conversation, BackendError> {
        self.api_key()
            .map_err(|e| BackendError::Init(e.to_string()))?;
        Ok(Conversation::new(system_instruction, budget_hint))
    }

    async fn send(
        &self,
        conversation: &Conversation,
        history: &[Message],
        text: &str,
    ) -> Result<String, BackendError> {
        let request = Self::build_request(conversation, history, text);
        let response: GenerateContentResponse = self
            .post("generateContent", &request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Self::extract_text(response)
    }

    async fn count_tokens(
        &self,
        system_instruction: &str,
        history: &[Message],
    ) -> Result<usize, BackendError> {
        // countTokens rejects an empty `contents` list.
        if history.is_empty() {
            return Ok(approx_token_count(system_instruction));
        }
        let request = CountTokensRequest {
            generate_content_request: CountTokensInner {
                model: self.model_path(),
                contents: Self::to_contents(history),
                system_instruction: Self::system_content(system_instruction),
            },
        };
        let response: CountTokensResponse = self
            .post("countTokens", &request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(response.total_tokens)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn describe_readiness(&self) -> String {
        if self.is_available() {
            format!("gemini backend '{}' ready at {}", self.model, self.base_url)
        } else {
            format!(
                "gemini backend '{}' missing credentials (set GEMINI_API_KEY)",
                self.model
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(key: Option<&str>) -> GeminiBackend {
        GeminiBackend::new(key, "", "gemini-2.5-flash", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_uses_models_prefix_once() {
        let b = backend(Some("k"));
        assert_eq!(
            b.endpoint("generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let prefixed =
            GeminiBackend::new(Some("k"), "http://proxy/", "models/x", Duration::from_secs(5))
                .unwrap();
        assert_eq!(prefixed.endpoint("countTokens"), "http://proxy/v1beta/models/x:countTokens");
    }

    #[test]
    fn request_maps_roles_and_budget() {
        let conv = Conversation::new("be brief", 512);
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let request = GeminiBackend::build_request(&conv, &history, "next");

        let json = serde_json::to_value(&request).unwrap();
        let roles: Vec<&str> = json["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["generationConfig"]["thinkingConfig"]["thinkingBudget"], 512);
    }

    #[test]
    fn zero_budget_omits_generation_config() {
        let conv = Conversation::new("", 0);
        let request = GeminiBackend::build_request(&conv, &[], "hi");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn extract_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(GeminiBackend::extract_text(response).unwrap(), "Hello");
    }

    #[test]
    fn extract_text_without_candidates_is_error() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            GeminiBackend::extract_text(response),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn explicit_key_makes_backend_available() {
        let b = backend(Some("secret"));
        assert!(b.is_available());
        assert!(b.create_conversation("sys", &[], 0).is_ok());
    }

    #[tokio::test]
    async fn empty_history_counts_locally() {
        // Port 9 is never listening; a network call here would fail.
        let b = GeminiBackend::new(Some("k"), "http://127.0.0.1:9", "m", Duration::from_secs(1))
            .unwrap();
        assert_eq!(b.count_tokens("abcdefgh", &[]).await.unwrap(), 2);
        assert_eq!(b.count_tokens("", &[]).await.unwrap(), 0);
    }
}
