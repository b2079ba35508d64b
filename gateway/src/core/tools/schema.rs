//! Tool declarations and the default system instructions sent to the model.

use serde_json::json;

use crate::core::upstream::messages::{ToolInputSchema, ToolSpec};

pub const WEATHER_TOOL: &str = "getWeatherTool";
pub const KNOWLEDGE_BASE_TOOL: &str = "queryKnowledgeBaseTool";
pub const DOCUMENT_SEARCH_TOOL: &str = "searchDocumentsTool";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a friendly, professional voice assistant talking with a company executive.

## Your role
- Keep the conversation friendly and professional.
- Keep answers short: two or three sentences suited to being spoken aloud.
- When the user asks about company policies, benefits or internal documents, use the \
knowledge tools before answering and base your answer on what they return.
- When the user asks about the weather, use the weather tool.

## Keeping the conversation going
- Invite further questions about what you know.
- Ask the user to tell you more about their company.

## Ending the conversation
When the user says they are done, thank them.";

fn schema(value: serde_json::Value) -> ToolInputSchema {
    ToolInputSchema {
        json: value.to_string(),
    }
}

/// Tools declared in every prompt.
pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: WEATHER_TOOL.to_string(),
            description: "Get the current weather for a given location, based on its WGS84 \
                          coordinates."
                .to_string(),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "latitude": {
                        "type": "string",
                        "description": "Geographical WGS84 latitude of the location."
                    },
                    "longitude": {
                        "type": "string",
                        "description": "Geographical WGS84 longitude of the location."
                    }
                },
                "required": ["latitude", "longitude"]
            })),
        },
        ToolSpec {
            name: KNOWLEDGE_BASE_TOOL.to_string(),
            description: "Answer questions about employment benefit policies using the \
                          company knowledge base."
                .to_string(),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user question about employment benefit policies"
                    }
                },
                "required": ["query"]
            })),
        },
        ToolSpec {
            name: DOCUMENT_SEARCH_TOOL.to_string(),
            description: "Search the company's internal documents for passages relevant to \
                          a question."
                .to_string(),
            input_schema: schema(json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user question to search for in company documents"
                    }
                },
                "required": ["query"]
            })),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tools_have_valid_schemas() {
        let tools = default_tools();
        assert_eq!(tools.len(), 3);
        for tool in &tools {
            let parsed: serde_json::Value = serde_json::from_str(&tool.input_schema.json).unwrap();
            assert_eq!(parsed["type"], "object");
            assert!(!parsed["required"].as_array().unwrap().is_empty());
        }
    }

    #[test]
    fn test_weather_requires_coordinates() {
        let weather = &default_tools()[0];
        let parsed: serde_json::Value = serde_json::from_str(&weather.input_schema.json).unwrap();
        assert_eq!(parsed["required"], json!(["latitude", "longitude"]));
    }
}
