//! Event type strings recognized on the wire.

// ============================================================================
// Response lifecycle
// ============================================================================

pub const RESPONSE_COMPLETED: &str = "response.completed";
pub const ERROR: &str = "error";

// ============================================================================
// Text output
// ============================================================================

pub const OUTPUT_TEXT_DELTA: &str = "response.output_text.delta";
pub const OUTPUT_TEXT_DONE: &str = "response.output_text.done";

// ============================================================================
// Tool lifecycle
// ============================================================================

pub const PHASE_IN_PROGRESS: &str = "in_progress";
pub const PHASE_EXECUTING: &str = "executing";
pub const PHASE_COMPLETED: &str = "completed";

pub const AGENTIC_SEARCH_ITERATION: &str = "response.agentic_search.query_phase.iteration";

// ============================================================================
// Tool identifiers
// ============================================================================

pub const TOOL_MCP_CALL: &str = "mcp_call";
pub const TOOL_FILE_SEARCH: &str = "file_search";
pub const TOOL_AGENTIC_SEARCH: &str = "agentic_search";
pub const TOOL_FUN_REQ_GATHERING: &str = "fun_req_gathering_tool";
pub const TOOL_FUN_DEF_GENERATION: &str = "fun_def_generation_tool";
pub const TOOL_MOCK_FUN_SAVE: &str = "mock_fun_save_tool";
pub const TOOL_MOCK_GENERATION: &str = "mock_generation_tool";
pub const TOOL_MOCK_SAVE: &str = "mock_save_tool";
