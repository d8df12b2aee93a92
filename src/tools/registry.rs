use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::external::{ExternalTool, STAGE_AND_TEST, staging_report_fallback};
use super::local::{DESIGN_UI, DEVELOP_LOGIC, LocalTool, design_ui, develop_logic};
use crate::config::MaestroConfig;
use crate::error::{MaestroError, Result};

/// The two handler kinds behind one `execute` contract.
#[derive(Debug, Clone)]
pub enum ToolHandler {
    Local(LocalTool),
    External(ExternalTool),
}

impl ToolHandler {
    pub fn local<F>(synthesize: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        ToolHandler::Local(LocalTool::new(synthesize))
    }

    pub async fn execute(&self, tool_name: &str, input: &Value) -> Result<Value> {
        match self {
            ToolHandler::Local(tool) => tool.execute(tool_name, input),
            ToolHandler::External(tool) => tool.execute(tool_name, input).await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolHandler::Local(_) => "local",
            ToolHandler::External(_) => "external",
        }
    }
}

/// Body of a direct tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
}

impl InvokeRequest {
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            input: Some(input),
        }
    }
}

/// Outcome of a direct tool invocation. Failures are reported in-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_name: String,
    pub execution_time_ms: u64,
}

impl InvokeResponse {
    fn failure(tool_name: impl Into<String>, err: &MaestroError, elapsed: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.reason()),
            tool_name: tool_name.into(),
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Name → handler bindings, kept in registration order.
///
/// Re-registering a name replaces the handler in place (last writer wins) and
/// logs a warning. Reads and writes may interleave from any thread.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<(String, Arc<ToolHandler>)>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the default pipeline's tools.
    pub fn with_defaults(config: &MaestroConfig) -> Self {
        let registry = Self::new();
        registry.register(DESIGN_UI, ToolHandler::local(design_ui));
        registry.register(DEVELOP_LOGIC, ToolHandler::local(develop_logic));
        registry.register(
            STAGE_AND_TEST,
            ToolHandler::External(
                ExternalTool::new(config.staging_url.clone())
                    .with_api_key(Some(config.staging_api_key.clone()))
                    .with_timeout(config.staging_timeout())
                    .with_fallback(staging_report_fallback()),
            ),
        );
        registry
    }

    /// Bind `name` to `handler`. Returns `true` if a previous binding was replaced.
    pub fn register(&self, name: impl Into<String>, handler: ToolHandler) -> bool {
        let name = name.into();
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = tools.iter_mut().find(|(n, _)| *n == name) {
            tracing::warn!(tool = %name, "tool already registered, overwriting");
            slot.1 = Arc::new(handler);
            return true;
        }
        tracing::debug!(tool = %name, kind = handler.kind(), "tool registered");
        tools.push((name, Arc::new(handler)));
        false
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ToolHandler>> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, handler)| Arc::clone(handler))
            .ok_or_else(|| {
                let available: Vec<&str> = tools.iter().map(|(n, _)| n.as_str()).collect();
                MaestroError::NotFound(format!(
                    "Tool '{name}' not found. Available tools: {}",
                    available.join(", ")
                ))
            })
    }

    /// Registered names in registration order.
    pub fn list_names(&self) -> Vec<String> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve and run a tool. The lock is released before the handler runs.
    pub async fn execute(&self, name: &str, input: &Value) -> Result<Value> {
        let handler = self.resolve(name)?;
        handler.execute(name, input).await
    }

    /// Run a tool and report the outcome in-band with timing.
    pub async fn invoke(&self, name: &str, input: Value) -> InvokeResponse {
        self.invoke_request(&InvokeRequest::new(name, input)).await
    }

    /// Validate a raw invocation request, then run it.
    pub async fn invoke_request(&self, request: &InvokeRequest) -> InvokeResponse {
        let started = Instant::now();

        let tool_name = match request.tool_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                let err = MaestroError::Validation("toolName is required".into());
                return InvokeResponse::failure("", &err, Duration::ZERO);
            }
        };
        let input = match &request.input {
            Some(input @ Value::Object(_)) => input,
            _ => {
                let err = MaestroError::Validation("input must be a valid object".into());
                return InvokeResponse::failure(tool_name, &err, Duration::ZERO);
            }
        };

        tracing::info!(tool = tool_name, "invoking tool");
        match self.execute(tool_name, input).await {
            Ok(data) => {
                let elapsed = started.elapsed();
                tracing::info!(tool = tool_name, elapsed_ms = elapsed.as_millis() as u64, "tool completed");
                InvokeResponse {
                    success: true,
                    data: Some(data),
                    error: None,
                    tool_name: tool_name.to_string(),
                    execution_time_ms: elapsed.as_millis() as u64,
                }
            }
            Err(err) => {
                tracing::error!(tool = tool_name, error = %err, "tool failed");
                InvokeResponse::failure(tool_name, &err, started.elapsed())
            }
        }
    }

    /// Capability summary: names with handler kinds.
    pub fn describe(&self) -> Value {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<Value> = tools
            .iter()
            .map(|(name, handler)| json!({ "name": name, "kind": handler.kind() }))
            .collect();
        json!({ "tools": entries, "count": entries.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: Value) -> ToolHandler {
        ToolHandler::local(move |_| Ok(value.clone()))
    }

    #[tokio::test]
    async fn reregistration_keeps_only_the_second_handler() {
        let registry = ToolRegistry::new();
        assert!(!registry.register("t", constant(json!(1))));
        assert!(registry.register("t", constant(json!(2))));

        assert_eq!(registry.execute("t", &json!({})).await.unwrap(), json!(2));
        assert_eq!(registry.list_names(), vec!["t".to_string()]);
    }

    #[test]
    fn list_names_follows_registration_order() {
        let registry = ToolRegistry::new();
        registry.register("b", constant(json!(null)));
        registry.register("a", constant(json!(null)));
        registry.register("c", constant(json!(null)));
        registry.register("a", constant(json!(1)));
        assert_eq!(registry.list_names(), vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn resolve_unknown_lists_available_tools() {
        let registry = ToolRegistry::new();
        registry.register("x/one", constant(json!(null)));
        registry.register("x/two", constant(json!(null)));
        let err = registry.resolve("nope").unwrap_err();
        assert!(matches!(err, MaestroError::NotFound(_)));
        assert_eq!(
            err.reason(),
            "Tool 'nope' not found. Available tools: x/one, x/two"
        );
    }

    #[tokio::test]
    async fn invoke_unknown_tool_reports_not_found() {
        let registry = ToolRegistry::new();
        let response = registry.invoke("unknown/tool", json!({})).await;
        assert!(!response.success);
        assert_eq!(response.tool_name, "unknown/tool");
        assert!(response.error.unwrap().contains("not found"));
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn invoke_requires_tool_name() {
        let registry = ToolRegistry::new();
        let request: InvokeRequest = serde_json::from_value(json!({"input": {}})).unwrap();
        let response = registry.invoke_request(&request).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("toolName is required"));
        assert_eq!(response.execution_time_ms, 0);
    }

    #[tokio::test]
    async fn invoke_requires_object_input() {
        let registry = ToolRegistry::new();
        registry.register("t", constant(json!(1)));
        let response = registry.invoke("t", json!([1, 2])).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("input must be a valid object"));
    }

    #[tokio::test]
    async fn invoke_success_serializes_camel_case() {
        let registry = ToolRegistry::new();
        registry.register("t", constant(json!({"ok": true})));
        let response = registry.invoke("t", json!({})).await;
        assert!(response.success);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["toolName"], "t");
        assert_eq!(value["data"], json!({"ok": true}));
        assert!(value.get("error").is_none());
        assert!(value["executionTimeMs"].is_u64());
    }

    #[tokio::test]
    async fn invoke_tool_failure_reports_cause() {
        let registry = ToolRegistry::new();
        registry.register("broken", ToolHandler::local(|_| Err("boom".into())));
        let response = registry.invoke("broken", json!({})).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    #[test]
    fn defaults_register_pipeline_tools() {
        let registry = ToolRegistry::with_defaults(&MaestroConfig::default());
        assert_eq!(
            registry.list_names(),
            vec![DESIGN_UI, DEVELOP_LOGIC, STAGE_AND_TEST]
        );
        let described = registry.describe();
        assert_eq!(described["count"], 3);
        assert_eq!(described["tools"][2]["kind"], "external");
    }

    #[test]
    fn concurrent_register_and_resolve() {
        let registry = Arc::new(ToolRegistry::new());
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.register(format!("tool/{}", i % 4), constant(json!(i)));
                    let _ = registry.resolve("tool/0");
                    registry.list_names()
                })
            })
            .collect();
        for handle in writers {
            handle.join().unwrap();
        }
        let mut names = registry.list_names();
        names.sort();
        assert_eq!(names, vec!["tool/0", "tool/1", "tool/2", "tool/3"]);
    }
}
