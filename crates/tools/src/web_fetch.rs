//! Web fetch tool: HTTP GET a URL and return the body as text.

use std::time::Duration;

use async_trait::async_trait;
use steward_core::descriptor::ToolDescriptor;
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};
use tracing::{debug, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_CHARS: usize = 20_000;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("steward/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_url(url: &str) -> Result<(), ToolError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ToolError::InvalidArguments(
            "URL must start with http:// or https://".into(),
        ));
    }
    if url.len() <= "https://".len() || url.contains(char::is_whitespace) {
        return Err(ToolError::InvalidArguments(format!("Invalid URL: {url}")));
    }
    Ok(())
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page or API endpoint by URL over HTTP and return the response body as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::infer(self.name(), self.description(), self.parameters_schema())
            .with_timeout(FETCH_TIMEOUT)
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let url = arguments["url"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        validate_url(url)?;

        debug!(url = %url, "Fetching URL");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_fetch".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_fetch".into(),
            reason: format!("failed to read body: {e}"),
        })?;

        let total_chars = body.chars().count();
        let mut text: String = body.chars().take(MAX_BODY_CHARS).collect();
        if total_chars > MAX_BODY_CHARS {
            text.push_str(&format!("\n[truncated: {total_chars} chars total]"));
        }

        let data = serde_json::json!({
            "status": status.as_u16(),
            "content_type": content_type,
        });
        if status.is_success() {
            Ok(ToolOutput::ok(text).with_data(data))
        } else {
            Ok(ToolOutput::failed(format!("HTTP {status}\n{text}")).with_data(data))
        }
    }
}
