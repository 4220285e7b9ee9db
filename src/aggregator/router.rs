//! Tool Event Router.
//!
//! Maps a tool identifier from a `response.<identifier>.<phase>` event to the
//! `{server_name, tool_name}` pair that keys its execution. New tool kinds are
//! registry entries; the aggregator only calls [`ToolEventRouter::begin_execution`]
//! and [`ToolEventRouter::complete_execution`].

use rustc_hash::FxHashMap;

use super::state::{ExecutionTable, ToolExecution, ToolKey, ToolStatus};
use crate::protocol::event_types::{
    TOOL_AGENTIC_SEARCH, TOOL_FILE_SEARCH, TOOL_FUN_DEF_GENERATION, TOOL_FUN_REQ_GATHERING,
    TOOL_MCP_CALL, TOOL_MOCK_FUN_SAVE, TOOL_MOCK_GENERATION, TOOL_MOCK_SAVE,
};

/// Registry entry for one tool identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub server_name: String,
    pub tool_name: String,
}

impl ToolDescriptor {
    #[must_use]
    pub fn new(server_name: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            tool_name: tool_name.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> ToolKey {
        ToolKey::new(&self.server_name, &self.tool_name)
    }
}

const BUILTIN_TOOLS: &[(&str, &str, &str)] = &[
    (TOOL_MCP_CALL, "mcp", "mcp_call"),
    (TOOL_FILE_SEARCH, "knowledge_base", "file_search"),
    (TOOL_AGENTIC_SEARCH, "knowledge_base", "agentic_search"),
    (
        TOOL_FUN_REQ_GATHERING,
        "function_builder",
        "requirements_gathering",
    ),
    (
        TOOL_FUN_DEF_GENERATION,
        "function_builder",
        "definition_generation",
    ),
    (TOOL_MOCK_FUN_SAVE, "function_builder", "mock_function_save"),
    (TOOL_MOCK_GENERATION, "mock_builder", "mock_generation"),
    (TOOL_MOCK_SAVE, "mock_builder", "mock_save"),
];

/// Responses lifecycle namespaces that look like `server_tool` but never name
/// a tool.
const RESERVED_NAMESPACES: &[&str] = &[
    "output_item",
    "output_text",
    "content_part",
    "function_call_arguments",
    "reasoning_summary_part",
    "reasoning_summary_text",
    "reasoning_text",
    "audio_transcript",
];

/// Lookup-driven dispatcher from tool identifier to execution key.
#[derive(Debug, Clone)]
pub struct ToolEventRouter {
    entries: FxHashMap<String, ToolDescriptor>,
    generic_fallback: bool,
}

impl ToolEventRouter {
    /// An empty router that only resolves `server_tool` compound identifiers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            generic_fallback: true,
        }
    }

    /// A router preloaded with the built-in tool kinds.
    #[must_use]
    pub fn with_builtin_tools() -> Self {
        let mut router = Self::new();
        for (identifier, server_name, tool_name) in BUILTIN_TOOLS {
            router.register(*identifier, ToolDescriptor::new(*server_name, *tool_name));
        }
        router
    }

    /// Disable the `server_tool` split for identifiers with no registry entry.
    #[must_use]
    pub fn without_generic_fallback(mut self) -> Self {
        self.generic_fallback = false;
        self
    }

    /// Register (or replace) a tool identifier.
    pub fn register(&mut self, identifier: impl Into<String>, descriptor: ToolDescriptor) {
        self.entries.insert(identifier.into(), descriptor);
    }

    /// Whether `identifier` has a registry entry.
    #[must_use]
    pub fn is_registered(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an identifier to its descriptor.
    ///
    /// Registered identifiers win; otherwise a generic custom-tool identifier
    /// is split on its first underscore into `server_tool`.
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> Option<ToolDescriptor> {
        if let Some(descriptor) = self.entries.get(identifier) {
            return Some(descriptor.clone());
        }
        if !self.generic_fallback || RESERVED_NAMESPACES.contains(&identifier) {
            return None;
        }
        let (server, tool) = identifier.split_once('_')?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        Some(ToolDescriptor::new(server, tool))
    }

    /// Upsert an in-progress execution. A repeated start for the same key
    /// overwrites the entry in place while it is still in progress; a
    /// completed execution stays completed.
    pub fn begin_execution(&self, table: &mut ExecutionTable, descriptor: &ToolDescriptor) {
        let key = descriptor.key();
        match table.get(&key).map(|execution| execution.status) {
            Some(ToolStatus::Completed) => {
                tracing::debug!(
                    key = %key,
                    "tool start for a completed execution ignored"
                );
                return;
            }
            Some(ToolStatus::InProgress) => {
                tracing::debug!(
                    server = %descriptor.server_name,
                    tool = %descriptor.tool_name,
                    "tool start replaced an existing execution"
                );
            }
            None => {}
        }
        table.upsert(
            key,
            ToolExecution {
                server_name: descriptor.server_name.clone(),
                tool_name: descriptor.tool_name.clone(),
                status: ToolStatus::InProgress,
                agentic_search_logs: Vec::new(),
            },
        );
    }

    /// Mark an execution completed. Unknown keys and repeated completions are
    /// no-ops; returns whether the status changed.
    pub fn complete_execution(&self, table: &mut ExecutionTable, key: &ToolKey) -> bool {
        match table.get_mut(key) {
            Some(execution) if execution.status == ToolStatus::InProgress => {
                execution.status = ToolStatus::Completed;
                true
            }
            Some(_) => false,
            None => {
                tracing::debug!(key = %key, "completion for unknown tool execution ignored");
                false
            }
        }
    }
}

impl Default for ToolEventRouter {
    fn default() -> Self {
        Self::with_builtin_tools()
    }
}
