//! Translation backend: one chat-completion call per post.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::translate::model::{
    ChatMessage, ChatRequest, ChatResponse, ResponseFormat, TranslationReply,
};

pub mod model;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translator is not configured: {0}")]
    NotConfigured(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("translator error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed translator response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslationRequest {
    pub original_text: String,
    pub quoted_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translation {
    pub translated_text: String,
    pub comment_text: Option<String>,
    pub quoted_translated_text: Option<String>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    fn ensure_ready(&self) -> Result<(), TranslateError> {
        Ok(())
    }

    /// Posts already in this language are not sent to the backend.
    fn target_language(&self) -> &str;

    async fn translate(&self, request: &TranslationRequest)
        -> Result<Translation, TranslateError>;
}

#[derive(Clone)]
pub struct OpenAiTranslator {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    target_language: String,
}

impl fmt::Debug for OpenAiTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiTranslator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiTranslator {
    pub fn from_config(cfg: &Config) -> Result<Self, TranslateError> {
        let base_url = Url::parse(&cfg.translator.base_url)
            .map_err(|e| TranslateError::NotConfigured(format!("invalid base_url: {e}")))?;
        Self::with_base_url(
            cfg.translator_api_key(),
            base_url,
            cfg.translator.model.clone(),
            cfg.translator.target_language.clone(),
            Duration::from_secs(cfg.translator.timeout_secs),
        )
    }

    pub fn with_base_url(
        api_key: Option<String>,
        base_url: Url,
        model: String,
        target_language: String,
        timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let http = Client::builder()
            .user_agent(concat!("x-watchbot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            target_language,
        })
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a professional translator. Translate the tweet in `text` into {lang}, \
             keeping the original meaning and tone. If `quoted_text` is present, translate it too. \
             Then write a short comment in {lang} on what the tweet says. \
             Answer with a JSON object: \
             {{\"translation\": string, \"comment\": string, \"quoted_translation\": string or null}}.",
            lang = self.target_language
        )
    }

    pub fn build_request(&self, request: &TranslationRequest) -> Result<reqwest::Request, TranslateError> {
        let api_key = self.api_key.as_deref().ok_or_else(missing_key)?;
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .map_err(|e| TranslateError::NotConfigured(format!("invalid base_url: {e}")))?;
        let user = json!({
            "text": request.original_text,
            "quoted_text": request.quoted_text,
        });
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.3,
            response_format: ResponseFormat { typ: "json_object" },
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: self.system_prompt(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user.to_string(),
                },
            ],
        };
        Ok(self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .build()?)
    }
}

fn missing_key() -> TranslateError {
    TranslateError::NotConfigured(format!(
        "translator.api_key is empty and {} is not set",
        crate::config::TRANSLATOR_KEY_ENV
    ))
}

#[async_trait]
impl Translator for OpenAiTranslator {
    fn ensure_ready(&self) -> Result<(), TranslateError> {
        self.api_key.as_ref().map(|_| ()).ok_or_else(missing_key)
    }

    fn target_language(&self) -> &str {
        &self.target_language
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<Translation, TranslateError> {
        let http_request = self.build_request(request)?;
        debug!(url = %http_request.url(), "translator request");
        let res = self.http.execute(http_request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = if status == StatusCode::TOO_MANY_REQUESTS {
                format!("rate limited: {body}")
            } else {
                body
            };
            return Err(TranslateError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let payload: ChatResponse = res
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TranslateError::Malformed("no choices in response".into()))?;
        parse_reply(&content, request.quoted_text.is_some())
    }
}

/// Parse the model's JSON answer. A missing or empty translation is an error;
/// a quoted translation is dropped when nothing was quoted.
pub fn parse_reply(content: &str, has_quoted: bool) -> Result<Translation, TranslateError> {
    let reply: TranslationReply = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| TranslateError::Malformed(e.to_string()))?;
    let translated_text = reply
        .translation
        .map(|t| strip_index_prefix(&t).to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TranslateError::Malformed("empty translation".into()))?;
    let non_empty = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(Translation {
        translated_text,
        comment_text: non_empty(reply.comment),
        quoted_translated_text: if has_quoted {
            non_empty(reply.quoted_translation)
        } else {
            None
        },
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

/// Models sometimes echo an index like `[1] ` in front of the translation.
fn strip_index_prefix(text: &str) -> &str {
    let trimmed = text.trim();
    let Some((index, rest)) = trimmed.strip_prefix('[').and_then(|t| t.split_once(']')) else {
        return trimmed;
    };
    if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
        rest.trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator(key: Option<&str>) -> OpenAiTranslator {
        OpenAiTranslator::with_base_url(
            key.map(str::to_string),
            Url::parse("https://llm.example.com/").unwrap(),
            "gpt-4o-mini".into(),
            "zh".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn parse_reply_reads_all_fields() {
        let t = parse_reply(
            r#"{"translation":"你好","comment":"问候","quoted_translation":"原文"}"#,
            true,
        )
        .unwrap();
        assert_eq!(t.translated_text, "你好");
        assert_eq!(t.comment_text.as_deref(), Some("问候"));
        assert_eq!(t.quoted_translated_text.as_deref(), Some("原文"));
    }

    #[test]
    fn parse_reply_drops_unrequested_quote_and_fences() {
        let t = parse_reply(
            "```json\n{\"translation\":\"[2] 你好\",\"comment\":\"\",\"quoted_translation\":\"x\"}\n```",
            false,
        )
        .unwrap();
        assert_eq!(t.translated_text, "你好");
        assert!(t.comment_text.is_none());
        assert!(t.quoted_translated_text.is_none());
    }

    #[test]
    fn parse_reply_rejects_empty_or_invalid() {
        assert!(matches!(
            parse_reply(r#"{"translation":"  "}"#, false),
            Err(TranslateError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply("not json", false),
            Err(TranslateError::Malformed(_))
        ));
    }

    #[test]
    fn strip_index_prefix_keeps_other_brackets() {
        assert_eq!(strip_index_prefix("[12] hi"), "hi");
        assert_eq!(strip_index_prefix("[note] hi"), "[note] hi");
        assert_eq!(strip_index_prefix("[] hi"), "[] hi");
    }

    #[test]
    fn build_request_targets_chat_completions() {
        let t = translator(Some("sk-test"));
        let req = t
            .build_request(&TranslationRequest {
                original_text: "hello".into(),
                quoted_text: None,
            })
            .unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().path(), "/v1/chat/completions");
        assert_eq!(
            req.headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok()),
            Some("Bearer sk-test")
        );
    }

    #[test]
    fn missing_key_is_not_ready() {
        let t = translator(None);
        assert!(matches!(
            t.ensure_ready(),
            Err(TranslateError::NotConfigured(_))
        ));
    }
}
