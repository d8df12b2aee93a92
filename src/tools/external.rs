use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{MaestroError, Result};

pub const STAGE_AND_TEST: &str = "staging/stage-and-test";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A handler that forwards its input to a remote service.
///
/// One attempt per call: no retry. When a fallback payload is configured, a
/// missing API key or a refused connection yields that payload labeled as
/// synthetic instead of an error.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    fallback: Option<Value>,
    client: Client,
}

impl ExternalTool {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            fallback: None,
            client: Client::new(),
        }
    }

    /// Empty keys count as unconfigured.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, tool_name: &str, input: &Value) -> Result<Value> {
        if self.api_key.is_none()
            && let Some(payload) = self.synthetic("no API key configured")
        {
            tracing::warn!(tool = tool_name, "API key not set, returning synthetic result");
            return Ok(payload);
        }

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "input": input }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return self.transport_failure(tool_name, err),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body
            };
            tracing::warn!(tool = tool_name, status = status.as_u16(), "external call rejected");
            return Err(MaestroError::ExternalCall {
                message,
                status: Some(status.as_u16()),
            });
        }

        response.json::<Value>().await.map_err(|err| {
            if err.is_timeout() {
                MaestroError::timeout()
            } else {
                MaestroError::ExternalCall {
                    message: format!("invalid response body: {err}"),
                    status: Some(status.as_u16()),
                }
            }
        })
    }

    fn transport_failure(&self, tool_name: &str, err: reqwest::Error) -> Result<Value> {
        if err.is_timeout() {
            tracing::warn!(
                tool = tool_name,
                timeout_ms = self.timeout.as_millis() as u64,
                "external call timed out"
            );
            return Err(MaestroError::timeout());
        }
        if err.is_connect()
            && let Some(payload) = self.synthetic("service unreachable")
        {
            tracing::warn!(tool = tool_name, url = %self.url, "service unreachable, returning synthetic result");
            return Ok(payload);
        }
        tracing::warn!(tool = tool_name, error = %err, "external call failed");
        Err(MaestroError::ExternalCall {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        })
    }

    fn synthetic(&self, reason: &str) -> Option<Value> {
        let payload = self.fallback.as_ref()?;
        let labeled = match payload.clone() {
            Value::Object(mut map) => {
                map.insert("synthetic".into(), Value::Bool(true));
                map.insert("syntheticReason".into(), Value::String(reason.into()));
                Value::Object(map)
            }
            other => json!({
                "synthetic": true,
                "syntheticReason": reason,
                "result": other,
            }),
        };
        Some(labeled)
    }
}

/// Degraded-mode staging report used when the staging service is unavailable.
pub fn staging_report_fallback() -> Value {
    json!({
        "toolName": STAGE_AND_TEST,
        "status": "completed",
        "result": {
            "environment": "staging",
            "deploymentUrl": "https://staging-example.com",
            "testResults": {
                "total": 15,
                "passed": 14,
                "failed": 1,
                "skipped": 0,
                "duration": 45000,
            },
            "tests": [
                { "name": "Homepage loads correctly", "status": "passed", "duration": 1200 },
                { "name": "User authentication works", "status": "passed", "duration": 2500 },
                {
                    "name": "Dashboard renders data",
                    "status": "failed",
                    "duration": 3000,
                    "error": "Expected 10 items, got 9",
                },
            ],
            "coverage": {
                "lines": 85.5,
                "branches": 78.2,
                "functions": 90.1,
                "statements": 84.8,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_wrapped_input_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invoke"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({"input": {"projectName": "demo"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deployed": true})))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ExternalTool::new(format!("{}/invoke", server.uri()))
            .with_api_key(Some("sk-test".into()));
        let out = tool
            .execute(STAGE_AND_TEST, &json!({"projectName": "demo"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"deployed": true}));
    }

    #[tokio::test]
    async fn omits_authorization_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
            .mount(&server)
            .await;

        let tool = ExternalTool::new(server.uri());
        tool.execute("remote/tool", &json!({})).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn http_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let tool = ExternalTool::new(server.uri()).with_api_key(Some("k".into()));
        let err = tool.execute("remote/tool", &json!({})).await.unwrap_err();
        match err {
            MaestroError::ExternalCall { message, status } => {
                assert_eq!(message, "overloaded");
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn http_error_is_not_masked_by_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = ExternalTool::new(server.uri())
            .with_api_key(Some("k".into()))
            .with_fallback(staging_report_fallback());
        let err = tool.execute(STAGE_AND_TEST, &json!({})).await.unwrap_err();
        assert!(matches!(err, MaestroError::ExternalCall { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let tool = ExternalTool::new(server.uri())
            .with_api_key(Some("k".into()))
            .with_timeout(Duration::from_millis(100));
        let err = tool.execute("remote/tool", &json!({})).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.reason(), "timeout");
    }

    #[tokio::test]
    async fn missing_key_uses_labeled_fallback_without_calling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tool = ExternalTool::new(server.uri())
            .with_api_key(Some("   ".into()))
            .with_fallback(staging_report_fallback());
        let out = tool.execute(STAGE_AND_TEST, &json!({})).await.unwrap();
        assert_eq!(out["synthetic"], true);
        assert_eq!(out["syntheticReason"], "no API key configured");
        assert_eq!(out["result"]["environment"], "staging");
    }

    #[tokio::test]
    async fn unreachable_service_uses_fallback() {
        // Port 1 on loopback refuses connections.
        let tool = ExternalTool::new("http://127.0.0.1:1/invoke")
            .with_api_key(Some("k".into()))
            .with_fallback(json!("raw"));
        let out = tool.execute(STAGE_AND_TEST, &json!({})).await.unwrap();
        assert_eq!(
            out,
            json!({"synthetic": true, "syntheticReason": "service unreachable", "result": "raw"})
        );
    }

    #[tokio::test]
    async fn unreachable_service_without_fallback_fails() {
        let tool = ExternalTool::new("http://127.0.0.1:1/invoke").with_api_key(Some("k".into()));
        let err = tool.execute("remote/tool", &json!({})).await.unwrap_err();
        assert!(matches!(err, MaestroError::ExternalCall { status: None, .. }));
        assert!(!err.is_timeout());
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        let tool = ExternalTool::new("http://localhost");
        assert_eq!(tool.timeout(), Duration::from_secs(30));
    }
}
