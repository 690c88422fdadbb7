//! Parsing model replies into actions.
//!
//! The model is asked to reply with one JSON object:
//!
//! ```json
//! {"action": "final_answer", "answer": "...", "thought": "..."}
//! {"action": "tool_call", "tool": "file_read", "arguments": {"path": "a.txt"}, "thought": "..."}
//! ```
//!
//! A `"tool_calls": [...]` list and a plain `Final Answer:` marker are also
//! accepted. A reply with no action object at all is an implicit final
//! answer. An object that claims to be an action but breaks the schema is
//! an [`ActionParseError`].

use serde_json::{Map, Value};

use crate::reply;

const FINAL_ANSWER_MARKER: &str = "Final Answer:";

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub tool: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FinalAnswer {
        answer: String,
        thought: Option<String>,
        /// No action marker was present; the raw reply is the answer
        implicit: bool,
    },
    ToolCalls {
        calls: Vec<ToolCallRequest>,
        thought: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionParseError {
    #[error("reply contains malformed JSON: {0}")]
    Malformed(String),

    #[error("unknown action \"{0}\"; use \"tool_call\" or \"final_answer\"")]
    UnknownAction(String),

    #[error("\"{action}\" is missing the \"{field}\" field")]
    MissingField { action: String, field: String },

    #[error("arguments for \"{tool}\" must be a JSON object")]
    InvalidArguments { tool: String },

    #[error("\"tool_calls\" must be a non-empty list")]
    EmptyToolCalls,
}

/// Parse one model reply.
pub fn parse_action(reply: &str) -> Result<Action, ActionParseError> {
    if let Some(json) = reply::find_json_object(reply) {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(obj)) if is_action_object(&obj) => return parse_object(&obj),
            Ok(_) => {}
            Err(e) if looks_like_action(json) => return Err(ActionParseError::Malformed(e.to_string())),
            Err(_) => {}
        }
    }

    if let Some(idx) = reply.find(FINAL_ANSWER_MARKER) {
        let answer = reply[idx + FINAL_ANSWER_MARKER.len()..].trim().to_string();
        let thought = reply[..idx].trim();
        return Ok(Action::FinalAnswer {
            answer,
            thought: (!thought.is_empty()).then(|| thought.to_string()),
            implicit: false,
        });
    }

    Ok(Action::FinalAnswer {
        answer: reply.trim().to_string(),
        thought: None,
        implicit: true,
    })
}

fn is_action_object(obj: &Map<String, Value>) -> bool {
    obj.contains_key("action") || obj.contains_key("tool_calls")
}

fn looks_like_action(json: &str) -> bool {
    json.contains("\"action\"") || json.contains("\"tool_calls\"")
}

fn parse_object(obj: &Map<String, Value>) -> Result<Action, ActionParseError> {
    let thought = obj
        .get("thought")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    if let Some(list) = obj.get("tool_calls") {
        let items = list.as_array().filter(|a| !a.is_empty()).ok_or(ActionParseError::EmptyToolCalls)?;
        let calls = items
            .iter()
            .map(|item| match item {
                Value::Object(call) => parse_call("tool_calls", call),
                _ => Err(ActionParseError::MissingField {
                    action: "tool_calls".into(),
                    field: "tool".into(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Action::ToolCalls { calls, thought });
    }

    let action = obj.get("action").and_then(Value::as_str).unwrap_or_default();
    match action {
        "final_answer" | "final" | "answer" => {
            let answer = obj
                .get("answer")
                .and_then(Value::as_str)
                .ok_or_else(|| ActionParseError::MissingField {
                    action: action.to_string(),
                    field: "answer".into(),
                })?;
            Ok(Action::FinalAnswer {
                answer: answer.trim().to_string(),
                thought,
                implicit: false,
            })
        }
        "tool_call" | "tool" => Ok(Action::ToolCalls {
            calls: vec![parse_call(action, obj)?],
            thought,
        }),
        other => Err(ActionParseError::UnknownAction(other.to_string())),
    }
}

fn parse_call(action: &str, obj: &Map<String, Value>) -> Result<ToolCallRequest, ActionParseError> {
    let tool = obj
        .get("tool")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ActionParseError::MissingField {
            action: action.to_string(),
            field: "tool".into(),
        })?
        .trim()
        .to_string();

    let arguments = match obj.get("arguments").or_else(|| obj.get("args")) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(map)) => Value::Object(map.clone()),
        // some models double-encode the arguments
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Object(_)) => v,
            _ => return Err(ActionParseError::InvalidArguments { tool }),
        },
        Some(_) => return Err(ActionParseError::InvalidArguments { tool }),
    };

    Ok(ToolCallRequest { tool, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_final_answer() {
        let action = parse_action(r#"{"action": "final_answer", "answer": " 42 ", "thought": "done"}"#).unwrap();
        assert_eq!(
            action,
            Action::FinalAnswer {
                answer: "42".into(),
                thought: Some("done".into()),
                implicit: false
            }
        );
    }

    #[test]
    fn parses_fenced_tool_call() {
        let reply = "Let me look.\n```json\n{\"action\": \"tool_call\", \"tool\": \"file_read\", \"arguments\": {\"path\": \"a.txt\"}}\n```";
        match parse_action(reply).unwrap() {
            Action::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].tool, "file_read");
                assert_eq!(calls[0].arguments, json!({"path": "a.txt"}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_arguments_default_to_empty_object() {
        match parse_action(r#"{"action": "tool_call", "tool": "get_current_time"}"#).unwrap() {
            Action::ToolCalls { calls, .. } => assert_eq!(calls[0].arguments, json!({})),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_encoded_arguments_are_accepted() {
        let reply = r#"{"action": "tool_call", "tool": "shell", "arguments": "{\"command\": \"ls\"}"}"#;
        match parse_action(reply).unwrap() {
            Action::ToolCalls { calls, .. } => assert_eq!(calls[0].arguments, json!({"command": "ls"})),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_tool_call_list() {
        let reply = r#"{"thought": "both", "tool_calls": [{"tool": "get_current_time"}, {"name": "calculator", "args": {"expression": "1+1"}}]}"#;
        match parse_action(reply).unwrap() {
            Action::ToolCalls { calls, thought } => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[1].tool, "calculator");
                assert_eq!(thought.as_deref(), Some("both"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn final_answer_marker() {
        let action = parse_action("I checked everything.\nFinal Answer: The build is green.").unwrap();
        assert_eq!(
            action,
            Action::FinalAnswer {
                answer: "The build is green.".into(),
                thought: Some("I checked everything.".into()),
                implicit: false
            }
        );
    }

    #[test]
    fn plain_text_is_implicit_answer() {
        let action = parse_action("Paris is the capital of France.").unwrap();
        assert!(matches!(action, Action::FinalAnswer { implicit: true, .. }));
    }

    #[test]
    fn unrelated_json_is_implicit_answer() {
        let reply = "Here is the config:\n{\"port\": 8080}";
        match parse_action(reply).unwrap() {
            Action::FinalAnswer { answer, implicit, .. } => {
                assert!(implicit);
                assert_eq!(answer, reply);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn schema_violations_are_errors() {
        assert_eq!(
            parse_action(r#"{"action": "dance"}"#),
            Err(ActionParseError::UnknownAction("dance".into()))
        );
        assert!(matches!(
            parse_action(r#"{"action": "tool_call", "arguments": {}}"#),
            Err(ActionParseError::MissingField { .. })
        ));
        assert!(matches!(
            parse_action(r#"{"action": "final_answer"}"#),
            Err(ActionParseError::MissingField { .. })
        ));
        assert!(matches!(
            parse_action(r#"{"action": "tool_call", "tool": "shell", "arguments": [1]}"#),
            Err(ActionParseError::InvalidArguments { .. })
        ));
        assert_eq!(parse_action(r#"{"tool_calls": []}"#), Err(ActionParseError::EmptyToolCalls));
    }

    #[test]
    fn malformed_action_json_is_an_error() {
        let reply = r#"{"action": "tool_call", "tool": "shell", "arguments": {"command": ls}}"#;
        assert!(matches!(parse_action(reply), Err(ActionParseError::Malformed(_))));
    }
}
