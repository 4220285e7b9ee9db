use serde::{Deserialize, Serialize};

/// A finished Responses API object.
///
/// `output` items stay raw so that one malformed item cannot fail the whole
/// response; each item is parsed into [`ResponsesOutputItem`] on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesOutput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<serde_json::Value>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

/// An output item in the Responses API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesOutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Vec<ResponsesContentPart>,
    },
    #[serde(rename = "function_call")]
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        name: String,
        #[serde(default)]
        arguments: Option<String>,
    },
    #[serde(rename = "custom_tool_call")]
    CustomToolCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        name: String,
        #[serde(default)]
        input: Option<String>,
    },
    #[serde(rename = "mcp_call")]
    McpCall {
        id: String,
        name: String,
        #[serde(default)]
        server_label: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// A content part in a Responses message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesContentPart {
    #[serde(rename = "output_text", alias = "text", alias = "input_text")]
    OutputText { text: String },
    #[serde(rename = "refusal")]
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

impl ResponsesOutputItem {
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(
            self,
            ResponsesOutputItem::FunctionCall { .. }
                | ResponsesOutputItem::CustomToolCall { .. }
                | ResponsesOutputItem::McpCall { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_item_types_parse_as_other() {
        let item: ResponsesOutputItem =
            serde_json::from_value(json!({"type": "reasoning", "summary": []})).expect("item");
        assert!(matches!(item, ResponsesOutputItem::Other));
    }

    #[test]
    fn function_call_item_parses() {
        let item: ResponsesOutputItem = serde_json::from_value(json!({
            "type": "function_call",
            "id": "fc_1",
            "call_id": "call_1",
            "name": "get_weather",
            "arguments": "{\"city\":\"SF\"}"
        }))
        .expect("item");
        assert!(item.is_tool_call());
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let output: ResponsesOutput = serde_json::from_value(json!({"output": []})).expect("output");
        assert!(output.id.is_none());
        assert!(output.output.is_empty());
    }
}
