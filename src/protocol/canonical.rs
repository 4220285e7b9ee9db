use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Canonical message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalRole {
    System,
    User,
    Assistant,
    Tool,
}

impl CanonicalRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalRole::System => "system",
            CanonicalRole::User => "user",
            CanonicalRole::Assistant => "assistant",
            CanonicalRole::Tool => "tool",
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// A tool call in provider-agnostic form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedToolCall {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A chat message or response output message in provider-agnostic form.
///
/// Text content and tool calls are mutually exclusive on assistant messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: CanonicalRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub tool_calls: SmallVec<[NormalizedToolCall; 1]>,
}

impl NormalizedMessage {
    #[must_use]
    pub fn text(role: CanonicalRole, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn with_tool_calls(
        role: CanonicalRole,
        tool_calls: SmallVec<[NormalizedToolCall; 1]>,
    ) -> Self {
        Self {
            role,
            content: None,
            tool_calls,
        }
    }

    /// Content that should produce a message event.
    #[must_use]
    pub fn non_empty_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|content| !content.is_empty())
    }
}

/// One top-level output item of a finished response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub messages: Vec<NormalizedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CanonicalUsage>,
    pub index: usize,
}

impl ModelOutput {
    /// An output slot that produced no messages.
    #[must_use]
    pub fn empty(index: usize) -> Self {
        Self {
            messages: Vec::new(),
            finish_reason: None,
            usage: None,
            index,
        }
    }
}
