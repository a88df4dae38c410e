use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::CommentSection;

const SYSTEM_INSTRUCTION: &str = "あなたはInstagramのフレンドリーなフォロワーです。投稿に対して自然で親しみやすい40字以下の日本語コメントを生成してください。絵文字を適度に使い、スパムっぽくならないよう注意してください。";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("completion payload malformed: {0}")]
    Malformed(String),
    #[error("completion was empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn for_caption(model: &str, caption: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(SYSTEM_INSTRUCTION),
                ChatMessage::user(format!(
                    "以下の投稿に対して、自然で親しみやすいコメントを40字以下で生成してください：\n\n{caption}"
                )),
            ],
        }
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Chat-completions endpoint with bearer authentication.
pub struct OpenAiChatBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiChatBackend {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiChatBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }
        let payload = response.json::<Value>().await?;
        extract_completion(&payload)
    }
}

/// Reads `choices[0].message.content`, trimmed.
pub fn extract_completion(payload: &Value) -> Result<String, LlmError> {
    let content = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))?;
    let text = content
        .as_str()
        .ok_or_else(|| LlmError::Malformed("content is not a string".into()))?
        .trim();
    if text.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(text.to_string())
}

/// Produces comment text; never fails, degrading to the fallback text.
pub struct CommentGenerator {
    backend: Option<Arc<dyn CompletionBackend>>,
    model: String,
    fallback: String,
    deadline: Duration,
}

impl CommentGenerator {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        model: impl Into<String>,
        fallback: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            fallback: fallback.into(),
            deadline,
        }
    }

    pub fn from_config(config: &CommentSection) -> Self {
        let backend = config.api_key().map(|key| {
            Arc::new(OpenAiChatBackend::new(config.endpoint.clone(), key)) as Arc<dyn CompletionBackend>
        });
        Self::new(
            backend,
            config.model.clone(),
            config.fallback(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub async fn generate(&self, caption: &str) -> String {
        let Some(backend) = &self.backend else {
            info!(target: "llm", "no text-generation key configured, using fallback comment");
            return self.fallback.clone();
        };

        let request = CompletionRequest::for_caption(&self.model, caption);
        match timeout(self.deadline, backend.complete(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                info!(target: "llm", comment = %text, "generated comment");
                text
            }
            Ok(Ok(_)) => {
                warn!(target: "llm", "empty completion, using fallback comment");
                self.fallback.clone()
            }
            Ok(Err(err)) => {
                warn!(target: "llm", error = %err, "comment generation failed, using fallback");
                self.fallback.clone()
            }
            Err(_) => {
                warn!(target: "llm", "timeout after {:?}, using fallback comment", self.deadline);
                self.fallback.clone()
            }
        }
    }
}
