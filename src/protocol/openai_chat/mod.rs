use serde::{Deserialize, Serialize};

/// `OpenAI` Chat Completion response wire type.
///
/// Choices stay raw so each one is parsed and degraded on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<serde_json::Value>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

/// A single choice in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    #[serde(default)]
    pub index: Option<u32>,
    pub message: OpenAiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// `OpenAI` message wire type, used for both request messages and choices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<OpenAiContent>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiContentPart {
    #[serde(default, rename = "type")]
    pub part_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A tool call within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    pub function: OpenAiToolCallFunction,
}

/// The function part of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl OpenAiContent {
    /// Text parts joined by newline; non-text parts are skipped.
    #[must_use]
    pub fn joined_text(&self) -> String {
        match self {
            OpenAiContent::Text(text) => text.clone(),
            OpenAiContent::Parts(parts) => {
                let mut out = String::new();
                for text in parts.iter().filter_map(OpenAiContentPart::text_value) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                out
            }
        }
    }
}

impl OpenAiContentPart {
    fn text_value(&self) -> Option<&str> {
        match self.part_type.as_deref() {
            None | Some("text" | "input_text" | "output_text") => self.text.as_deref(),
            Some(_) => None,
        }
    }
}
