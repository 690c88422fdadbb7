//! Current date and time.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};

pub struct CurrentTimeTool;

fn render<Tz: TimeZone>(now: DateTime<Tz>, zone: &str) -> ToolOutput
where
    Tz::Offset: std::fmt::Display,
{
    let text = now.format("%A, %B %-d, %Y %H:%M:%S %:z").to_string();
    ToolOutput::ok(text).with_data(serde_json::json!({
        "iso8601": now.to_rfc3339(),
        "unix": now.timestamp(),
        "weekday": now.weekday().to_string(),
        "timezone": zone,
    }))
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time, in UTC or the local system time zone."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "enum": ["utc", "local"],
                    "default": "local"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let zone = arguments["timezone"].as_str().unwrap_or("local").to_lowercase();
        match zone.as_str() {
            "utc" | "z" | "gmt" => Ok(render(Utc::now(), "utc")),
            "local" => Ok(render(Local::now(), "local")),
            other => Err(ToolError::InvalidArguments(format!(
                "unsupported timezone '{other}'; use 'utc' or 'local'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::descriptor::ToolCategory;

    #[test]
    fn inferred_as_system_tool() {
        let d = CurrentTimeTool.describe();
        assert_eq!(d.category, ToolCategory::System);
        assert!(!d.dangerous);
    }

    #[tokio::test]
    async fn utc_time_has_structured_data() {
        let out = CurrentTimeTool
            .execute(serde_json::json!({"timezone": "UTC"}))
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.output.ends_with("+00:00"));
        let data = out.data.unwrap();
        assert_eq!(data["timezone"], "utc");
        assert!(data["unix"].as_i64().unwrap() > 1_600_000_000);
    }

    #[tokio::test]
    async fn defaults_to_local_time() {
        let out = CurrentTimeTool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(out.data.unwrap()["timezone"], "local");
    }

    #[tokio::test]
    async fn unknown_timezone_is_rejected() {
        let result = CurrentTimeTool
            .execute(serde_json::json!({"timezone": "Mars/Olympus"}))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
