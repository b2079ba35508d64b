//! Tool dispatch for model-issued tool invocations.
//!
//! The model requests a tool with a `toolUse` event. The session turns it into a
//! [`ToolInvocation`], hands it to the [`ToolDispatcher`] and sends the resolved
//! payload back upstream as a `toolResult`. Every failure becomes an error
//! payload on the invocation so the model can recover conversationally.

pub mod schema;
mod weather;

pub use schema::{
    DEFAULT_SYSTEM_PROMPT, DOCUMENT_SEARCH_TOOL, KNOWLEDGE_BASE_TOOL, WEATHER_TOOL, default_tools,
};
pub use weather::{DEFAULT_WEATHER_API_URL, OpenMeteoWeather, WeatherProvider};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::codec::ContentEvent;
use crate::core::knowledge::{
    DocumentIndexResolver, KnowledgeError, KnowledgeResolver, KnowledgeSource,
};
use crate::errors::SessionError;
use weather::parse_coordinate;

/// Answer given when the document index has nothing relevant
pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents were found for that question.";

const DEFAULT_MAX_SEARCH_RESULTS: usize = 5;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while resolving a tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Knowledge lookup failed: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Weather lookup failed: {0}")]
    Weather(String),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidInput(_) => "invalid_tool_input",
            ToolError::Knowledge(_) => "knowledge_unavailable",
            ToolError::Weather(_) => "weather_unavailable",
        }
    }

    /// Payload returned to the model in place of a result.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": self.to_string(),
            "code": self.code(),
        })
    }

    /// Session-level error to report to subscribers, if any.
    ///
    /// Only malformed input is a protocol problem; backend failures are carried
    /// by the tool result alone.
    pub fn as_session_error(&self) -> Option<SessionError> {
        match self {
            ToolError::InvalidInput(msg) => Some(SessionError::InvalidToolInput(msg.clone())),
            ToolError::UnknownTool(name) => {
                Some(SessionError::InvalidToolInput(format!("unknown tool '{name}'")))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Invocations
// =============================================================================

/// Tools the dispatcher knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Weather,
    KnowledgeBase,
    DocumentSearch,
}

impl ToolKind {
    /// Match a tool name as declared to the model or by its short alias.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        [
            (WEATHER_TOOL, "weather", ToolKind::Weather),
            (KNOWLEDGE_BASE_TOOL, "knowledge-base", ToolKind::KnowledgeBase),
            (DOCUMENT_SEARCH_TOOL, "document-search", ToolKind::DocumentSearch),
        ]
        .into_iter()
        .find(|(declared, alias, _)| {
            name.eq_ignore_ascii_case(declared) || name.eq_ignore_ascii_case(alias)
        })
        .map(|(_, _, kind)| kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Weather => "weather",
            ToolKind::KnowledgeBase => "knowledge-base",
            ToolKind::DocumentSearch => "document-search",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationState {
    Pending,
    Resolved,
    Failed,
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Content block the `toolUse` arrived in
    pub content_id: String,
    pub tool_name: String,
    pub tool_use_id: String,
    pub input: Value,
    pub state: InvocationState,
    pub result: Option<Value>,
}

impl ToolInvocation {
    pub fn new(
        content_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_use_id: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            tool_name: tool_name.into(),
            tool_use_id: tool_use_id.into(),
            input,
            state: InvocationState::Pending,
            result: None,
        }
    }

    /// Build a pending invocation from a `toolUse` event.
    pub fn from_event(event: &ContentEvent) -> Option<Self> {
        match event {
            ContentEvent::ToolUse {
                content_id,
                tool_name,
                tool_use_id,
                input,
            } => Some(Self::new(
                content_id.clone(),
                tool_name.clone(),
                tool_use_id.clone(),
                input.clone(),
            )),
            _ => None,
        }
    }

    /// Input object, unwrapping inputs the model sent as a JSON-encoded string.
    fn input_object(&self) -> Value {
        match &self.input {
            Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    fn resolve(&mut self, result: Value) {
        self.state = InvocationState::Resolved;
        self.result = Some(result);
    }

    fn fail(&mut self, error: &ToolError) {
        self.state = InvocationState::Failed;
        self.result = Some(error.to_payload());
    }

    /// Text sent upstream as the `toolResult` content.
    pub fn result_text(&self) -> String {
        match &self.result {
            Some(value) => value.to_string(),
            None => Value::Null.to_string(),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Resolves tool invocations against the configured backends.
///
/// The dispatcher holds no per-call state; everything about a call lives in
/// its [`ToolInvocation`]. Backend calls are made once, without retry.
#[derive(Clone)]
pub struct ToolDispatcher {
    knowledge: Arc<dyn KnowledgeResolver>,
    documents: Arc<dyn DocumentIndexResolver>,
    weather: Arc<dyn WeatherProvider>,
    max_search_results: usize,
}

impl ToolDispatcher {
    pub fn new(
        knowledge: Arc<dyn KnowledgeResolver>,
        documents: Arc<dyn DocumentIndexResolver>,
        weather: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            knowledge,
            documents,
            weather,
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
        }
    }

    pub fn with_max_search_results(mut self, max_search_results: usize) -> Self {
        self.max_search_results = max_search_results.max(1);
        self
    }

    /// Resolve `invocation` against `source`.
    ///
    /// On return the invocation is always `Resolved` or `Failed` and carries a
    /// result payload; the error is returned as well so the caller can report it.
    pub async fn dispatch(
        &self,
        invocation: &mut ToolInvocation,
        source: KnowledgeSource,
    ) -> Result<(), ToolError> {
        info!(
            tool = %invocation.tool_name,
            tool_use_id = %invocation.tool_use_id,
            source = %source,
            "Dispatching tool invocation"
        );

        match self.run(invocation, source).await {
            Ok(result) => {
                debug!(tool_use_id = %invocation.tool_use_id, "Tool invocation resolved");
                invocation.resolve(result);
                Ok(())
            }
            Err(e) => {
                warn!(
                    tool = %invocation.tool_name,
                    tool_use_id = %invocation.tool_use_id,
                    "Tool invocation failed: {}",
                    e
                );
                invocation.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        invocation: &ToolInvocation,
        source: KnowledgeSource,
    ) -> Result<Value, ToolError> {
        let kind = ToolKind::parse(&invocation.tool_name)
            .ok_or_else(|| ToolError::UnknownTool(invocation.tool_name.clone()))?;
        let input = invocation.input_object();

        match kind {
            ToolKind::Weather => {
                let latitude = parse_coordinate(&input, "latitude", 90.0)?;
                let longitude = parse_coordinate(&input, "longitude", 180.0)?;
                self.weather.current_weather(latitude, longitude).await
            }
            ToolKind::KnowledgeBase | ToolKind::DocumentSearch => {
                let query = required_query(&input)?;
                self.query_knowledge(query, source).await
            }
        }
    }

    async fn query_knowledge(
        &self,
        query: &str,
        source: KnowledgeSource,
    ) -> Result<Value, ToolError> {
        match source {
            KnowledgeSource::Bedrock => {
                let answer = self.knowledge.resolve(query).await?;
                Ok(Value::String(answer))
            }
            KnowledgeSource::Sharepoint => {
                let hits = self.documents.search(query, self.max_search_results).await?;
                if hits.is_empty() {
                    return Ok(Value::String(NO_RELEVANT_DOCUMENTS.to_string()));
                }
                Ok(json!({
                    "query": query,
                    "results": hits,
                }))
            }
        }
    }
}

fn required_query(input: &Value) -> Result<&str, ToolError> {
    match input.get("query") {
        Some(Value::String(q)) if !q.trim().is_empty() => Ok(q.trim()),
        Some(Value::String(_)) => Err(ToolError::InvalidInput("'query' must not be empty".into())),
        Some(_) => Err(ToolError::InvalidInput("'query' must be a string".into())),
        None => Err(ToolError::InvalidInput(
            "missing required field 'query'".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::knowledge::{DocumentHit, KnowledgeResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FixedAnswer(Result<String, String>);

    #[async_trait]
    impl KnowledgeResolver for FixedAnswer {
        async fn resolve(&self, _query: &str) -> KnowledgeResult<String> {
            self.0.clone().map_err(KnowledgeError::Request)
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        hits: Vec<DocumentHit>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl DocumentIndexResolver for RecordingIndex {
        async fn search(&self, query: &str, max: usize) -> KnowledgeResult<Vec<DocumentHit>> {
            self.queries.lock().push((query.to_string(), max));
            Ok(self.hits.clone())
        }
    }

    struct SunnyWeather;

    #[async_trait]
    impl WeatherProvider for SunnyWeather {
        async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<Value, ToolError> {
            Ok(json!({"weather_data": {"latitude": latitude, "longitude": longitude, "sky": "clear"}}))
        }
    }

    fn dispatcher(answer: Result<&str, &str>, index: Arc<RecordingIndex>) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::new(FixedAnswer(
                answer.map(str::to_string).map_err(str::to_string),
            )),
            index,
            Arc::new(SunnyWeather),
        )
    }

    fn invocation(name: &str, input: Value) -> ToolInvocation {
        ToolInvocation::new("c-1", name, "t-1", input)
    }

    #[test]
    fn test_tool_kind_aliases() {
        assert_eq!(ToolKind::parse("getWeatherTool"), Some(ToolKind::Weather));
        assert_eq!(ToolKind::parse("Weather"), Some(ToolKind::Weather));
        assert_eq!(
            ToolKind::parse("queryKnowledgeBaseTool"),
            Some(ToolKind::KnowledgeBase)
        );
        assert_eq!(
            ToolKind::parse("document-search"),
            Some(ToolKind::DocumentSearch)
        );
        assert_eq!(ToolKind::parse("calendar"), None);
    }

    #[test]
    fn test_invocation_from_event() {
        let event = ContentEvent::ToolUse {
            content_id: "c-9".into(),
            tool_name: "getWeatherTool".into(),
            tool_use_id: "t-9".into(),
            input: json!({"latitude": 1}),
        };
        let inv = ToolInvocation::from_event(&event).unwrap();
        assert_eq!(inv.content_id, "c-9");
        assert_eq!(inv.state, InvocationState::Pending);
        assert!(ToolInvocation::from_event(&ContentEvent::StreamComplete).is_none());
    }

    #[tokio::test]
    async fn test_knowledge_base_answer_is_the_payload() {
        let dispatcher = dispatcher(Ok("15 days annually"), Arc::default());
        let mut inv = invocation("knowledge-base", json!({"query": "vacation days"}));
        dispatcher
            .dispatch(&mut inv, KnowledgeSource::Bedrock)
            .await
            .unwrap();
        assert_eq!(inv.state, InvocationState::Resolved);
        assert_eq!(inv.result, Some(json!("15 days annually")));
        assert_eq!(inv.result_text(), "\"15 days annually\"");
    }

    #[tokio::test]
    async fn test_resolver_failure_becomes_error_payload() {
        let dispatcher = dispatcher(Err("throttled"), Arc::default());
        let mut inv = invocation("queryKnowledgeBaseTool", json!({"query": "vacation days"}));
        let err = dispatcher
            .dispatch(&mut inv, KnowledgeSource::Bedrock)
            .await
            .unwrap_err();
        assert!(err.as_session_error().is_none());
        assert_eq!(inv.state, InvocationState::Failed);
        let payload = inv.result.unwrap();
        assert_eq!(payload["code"], "knowledge_unavailable");
        assert!(payload["error"].as_str().unwrap().contains("throttled"));
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid_input() {
        let dispatcher = dispatcher(Ok("unused"), Arc::default());
        let mut inv = invocation("knowledge-base", json!({"question": "vacation"}));
        let err = dispatcher
            .dispatch(&mut inv, KnowledgeSource::Bedrock)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_session_error(),
            Some(SessionError::InvalidToolInput(_))
        ));
        assert_eq!(inv.result.unwrap()["code"], "invalid_tool_input");
    }

    #[tokio::test]
    async fn test_sharepoint_source_searches_document_index() {
        let index = Arc::new(RecordingIndex {
            hits: vec![DocumentHit {
                name: "handbook.txt".into(),
                excerpt: "15 vacation days".into(),
                score: 2,
            }],
            ..Default::default()
        });
        let dispatcher = dispatcher(Ok("unused"), index.clone()).with_max_search_results(3);
        let mut inv = invocation("knowledge-base", json!({"query": " vacation days "}));
        dispatcher
            .dispatch(&mut inv, KnowledgeSource::Sharepoint)
            .await
            .unwrap();

        let result = inv.result.unwrap();
        assert_eq!(result["query"], "vacation days");
        assert_eq!(result["results"][0]["name"], "handbook.txt");
        assert_eq!(
            index.queries.lock().as_slice(),
            &[("vacation days".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_empty_document_search() {
        let dispatcher = dispatcher(Ok("unused"), Arc::default());
        let mut inv = invocation("searchDocumentsTool", json!({"query": "parking"}));
        dispatcher
            .dispatch(&mut inv, KnowledgeSource::Sharepoint)
            .await
            .unwrap();
        assert_eq!(inv.result, Some(json!(NO_RELEVANT_DOCUMENTS)));
    }

    #[tokio::test]
    async fn test_weather_with_string_input() {
        let dispatcher = dispatcher(Ok("unused"), Arc::default());
        let mut inv = invocation(
            "getWeatherTool",
            Value::String(r#"{"latitude":"48.85","longitude":"2.35"}"#.to_string()),
        );
        dispatcher
            .dispatch(&mut inv, KnowledgeSource::Bedrock)
            .await
            .unwrap();
        assert_eq!(inv.result.unwrap()["weather_data"]["latitude"], 48.85);
    }

    #[tokio::test]
    async fn test_weather_requires_coordinates() {
        let dispatcher = dispatcher(Ok("unused"), Arc::default());
        let mut inv = invocation("weather", json!({"latitude": 10}));
        let err = dispatcher
            .dispatch(&mut inv, KnowledgeSource::Bedrock)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert_eq!(inv.state, InvocationState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dispatcher = dispatcher(Ok("unused"), Arc::default());
        let mut inv = invocation("calendar", json!({}));
        let err = dispatcher
            .dispatch(&mut inv, KnowledgeSource::Bedrock)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
        assert_eq!(inv.result.unwrap()["code"], "unknown_tool");
    }
}
