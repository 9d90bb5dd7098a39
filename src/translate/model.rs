use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub response_format: ResponseFormat,
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub typ: &'static str,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
pub struct ChatChoice {
    pub message: ChatReply,
}

#[derive(Deserialize, Debug)]
pub struct ChatReply {
    pub content: Option<String>,
}

/// The JSON object the model is asked to answer with.
#[derive(Deserialize, Debug)]
pub struct TranslationReply {
    pub translation: Option<String>,
    pub comment: Option<String>,
    pub quoted_translation: Option<String>,
}
