use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};

use super::session::TurnId;
use crate::protocol::canonical::CanonicalUsage;

/// Composite `server/tool` key identifying a tool execution within a turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolKey(String);

impl ToolKey {
    #[must_use]
    pub fn new(server_name: &str, tool_name: &str) -> Self {
        let mut key = String::with_capacity(server_name.len() + tool_name.len() + 1);
        key.push_str(server_name);
        key.push('/');
        key.push_str(tool_name);
        Self(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    InProgress,
    Completed,
}

/// One agentic-search iteration, appended and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgenticSearchLogEntry {
    pub iteration: u32,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Distinct citations in arrival order.
    pub citations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_iterations: Option<u32>,
}

/// Tracked lifecycle of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolExecution {
    pub server_name: String,
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub agentic_search_logs: Vec<AgenticSearchLogEntry>,
}

impl ToolExecution {
    #[must_use]
    pub fn key(&self) -> ToolKey {
        ToolKey::new(&self.server_name, &self.tool_name)
    }
}

/// Insertion-ordered table of tool executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTable {
    executions: Vec<ToolExecution>,
    index: FxHashMap<ToolKey, usize>,
}

impl ExecutionTable {
    /// Insert or overwrite in place. Returns `true` when an entry was replaced.
    pub fn upsert(&mut self, key: ToolKey, execution: ToolExecution) -> bool {
        if let Some(&slot) = self.index.get(&key) {
            self.executions[slot] = execution;
            return true;
        }
        self.index.insert(key, self.executions.len());
        self.executions.push(execution);
        false
    }

    #[must_use]
    pub fn get(&self, key: &ToolKey) -> Option<&ToolExecution> {
        self.index.get(key).map(|&slot| &self.executions[slot])
    }

    pub fn get_mut(&mut self, key: &ToolKey) -> Option<&mut ToolExecution> {
        self.index.get(key).map(|&slot| &mut self.executions[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolExecution> {
        self.executions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ToolExecution> {
        self.executions.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn clear(&mut self) {
        self.executions.clear();
        self.index.clear();
    }

    /// Ordered copy used as a content block view.
    #[must_use]
    pub fn view(&self) -> Vec<ToolExecution> {
        self.executions.clone()
    }
}

impl Serialize for ExecutionTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.executions.iter())
    }
}

/// One renderable unit of the aggregated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { content: String },
    ToolProgress { tool_executions: Vec<ToolExecution> },
    InlineLoading,
}

impl ContentBlock {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        ContentBlock::Text {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// Terminal upstream failure for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamFailure {
    pub code: String,
    pub message: String,
}

impl StreamFailure {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// `[code] message`, as rendered in the terminal text block.
    #[must_use]
    pub fn display_text(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl From<StreamFailure> for crate::error::CanonicalError {
    fn from(failure: StreamFailure) -> Self {
        crate::error::CanonicalError::Upstream {
            code: failure.code,
            message: failure.message,
        }
    }
}

/// Aggregate root for one in-flight turn.
///
/// Mutated only by [`super::StreamAggregator`]; consumers receive it by
/// reference or as a cloned snapshot after every processed event.
#[derive(Debug, Clone, Serialize)]
pub struct StreamState {
    pub(crate) turn: Option<TurnId>,
    pub(crate) content_blocks: Vec<ContentBlock>,
    pub(crate) streaming_text: String,
    pub(crate) active_tool_executions: ExecutionTable,
    pub(crate) is_streaming: bool,
    #[serde(skip)]
    pub(crate) current_text_block: Option<usize>,
    pub(crate) response_id: Option<String>,
    pub(crate) usage: Option<CanonicalUsage>,
    pub(crate) encountered_error: bool,
    pub(crate) error: Option<StreamFailure>,
}

impl StreamState {
    #[must_use]
    pub(crate) fn idle() -> Self {
        Self {
            turn: None,
            content_blocks: Vec::new(),
            streaming_text: String::new(),
            active_tool_executions: ExecutionTable::default(),
            is_streaming: false,
            current_text_block: None,
            response_id: None,
            usage: None,
            encountered_error: false,
            error: None,
        }
    }

    #[must_use]
    pub fn turn(&self) -> Option<&TurnId> {
        self.turn.as_ref()
    }

    #[must_use]
    pub fn content_blocks(&self) -> &[ContentBlock] {
        &self.content_blocks
    }

    #[must_use]
    pub fn streaming_text(&self) -> &str {
        &self.streaming_text
    }

    #[must_use]
    pub fn active_tool_executions(&self) -> &ExecutionTable {
        &self.active_tool_executions
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Index of the text block currently receiving deltas.
    #[must_use]
    pub fn current_text_block(&self) -> Option<usize> {
        self.current_text_block
    }

    #[must_use]
    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    #[must_use]
    pub fn usage(&self) -> Option<&CanonicalUsage> {
        self.usage.as_ref()
    }

    #[must_use]
    pub fn encountered_error(&self) -> bool {
        self.encountered_error
    }

    #[must_use]
    pub fn error(&self) -> Option<&StreamFailure> {
        self.error.as_ref()
    }

    /// Concatenated content of all text blocks, in order.
    #[must_use]
    pub fn rendered_text(&self) -> String {
        self.content_blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect()
    }
}
