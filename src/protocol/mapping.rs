use super::canonical::{CanonicalRole, CanonicalUsage};

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

/// Map a request-side chat role to a canonical role.
///
/// `developer` maps to `System` only when `convert_developer_to_system` is
/// set; unknown roles return `None`.
#[must_use]
pub fn chat_role_to_canonical(s: &str, convert_developer_to_system: bool) -> Option<CanonicalRole> {
    match s {
        "system" => Some(CanonicalRole::System),
        "developer" if convert_developer_to_system => Some(CanonicalRole::System),
        "user" => Some(CanonicalRole::User),
        "assistant" => Some(CanonicalRole::Assistant),
        "tool" | "function" => Some(CanonicalRole::Tool),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Finish reason mappings
// ---------------------------------------------------------------------------

/// Finish reason for one Responses API output item.
///
/// `status` is the response status, `incomplete_reason` the
/// `incomplete_details.reason` field.
#[must_use]
pub fn responses_finish_reason(
    status: Option<&str>,
    incomplete_reason: Option<&str>,
    is_tool_call: bool,
) -> Option<String> {
    let reason = match (status, incomplete_reason) {
        (Some("incomplete"), Some("max_output_tokens")) => "length",
        (Some("incomplete"), Some("content_filter")) => "content_filter",
        (Some("incomplete"), _) => "incomplete",
        (Some("failed"), _) => "error",
        (Some("cancelled"), _) => "cancelled",
        (Some("in_progress" | "queued"), _) => return None,
        _ if is_tool_call => "tool_calls",
        _ => "stop",
    };
    Some(reason.to_owned())
}

// ---------------------------------------------------------------------------
// Usage mappings
// ---------------------------------------------------------------------------

/// Convert Responses-style (`input_tokens`) or Chat-style (`prompt_tokens`)
/// usage JSON to canonical usage.
#[must_use]
pub fn usage_to_canonical(val: &serde_json::Value) -> Option<CanonicalUsage> {
    let field = |primary: &str, fallback: &str| {
        val.get(primary)
            .or_else(|| val.get(fallback))
            .and_then(serde_json::Value::as_u64)
    };
    let input_tokens = field("input_tokens", "prompt_tokens");
    let output_tokens = field("output_tokens", "completion_tokens");
    let total_tokens = val
        .get("total_tokens")
        .and_then(serde_json::Value::as_u64)
        .or(match (input_tokens, output_tokens) {
            (Some(i), Some(o)) => i.checked_add(o),
            _ => None,
        });

    if input_tokens.is_none() && output_tokens.is_none() && total_tokens.is_none() {
        return None;
    }
    Some(CanonicalUsage {
        input_tokens,
        output_tokens,
        total_tokens,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
