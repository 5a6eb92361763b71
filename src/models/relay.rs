use serde::{ Serialize, Deserialize };
use serde_json::Value;

use crate::error::RelayError;
use super::chat::Turn;

/// Terminal marker shared by the upstream stream and the relayed one.
pub const SENTINEL: &str = "[DONE]";

/// A validated relay call.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub turns: Vec<Turn>,
    pub stream: bool,
}

impl RelayRequest {
    /// Checks the raw body against `{messages: [{role, content}], stream?: bool}`.
    pub fn from_value(body: Value) -> Result<Self, RelayError> {
        let obj = body
            .as_object()
            .ok_or_else(|| RelayError::InvalidRequest("Request body must be a JSON object".into()))?;

        let items = match obj.get("messages") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => {
                return Err(RelayError::InvalidRequest("Messages array is required".into()));
            }
        };

        let turns = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<Turn>(item.clone()).map_err(|e| {
                    RelayError::InvalidRequest(format!("messages[{}] is not a valid turn: {}", i, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let stream = match obj.get("stream") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(RelayError::InvalidRequest("stream must be a boolean".into()));
            }
        };

        Ok(Self { turns, stream })
    }
}

#[derive(Serialize, Debug)]
pub struct RelayRequestBody<'a> {
    pub messages: &'a [Turn],
    pub stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub message: Turn,
    pub usage: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// One frame of the relayed event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Delta(String),
    Done,
    Error(String),
}

#[derive(Serialize, Deserialize)]
struct FrameDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct FrameChoice {
    delta: FrameDelta,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FrameBody {
    Delta {
        choices: Vec<FrameChoice>,
    },
    Error {
        error: String,
    },
}

impl RelayFrame {
    /// Payload of the `data:` field for this frame.
    pub fn data(&self) -> String {
        let body = match self {
            RelayFrame::Done => {
                return SENTINEL.to_string();
            }
            RelayFrame::Delta(content) =>
                FrameBody::Delta {
                    choices: vec![FrameChoice {
                        delta: FrameDelta { content: Some(content.clone()) },
                    }],
                },
            RelayFrame::Error(message) => FrameBody::Error { error: message.clone() },
        };
        serde_json::to_string(&body).unwrap_or_else(|_| {
            format!("{{\"error\":{:?}}}", crate::error::STREAM_FAILURE_MESSAGE)
        })
    }

    /// Parses a `data:` payload. `Ok(None)` means the frame carried nothing to apply.
    pub fn decode(data: &str) -> Result<Option<RelayFrame>, serde_json::Error> {
        let data = data.trim();
        if data == SENTINEL {
            return Ok(Some(RelayFrame::Done));
        }
        let frame = match serde_json::from_str::<FrameBody>(data)? {
            FrameBody::Delta { choices } => choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .map(RelayFrame::Delta),
            FrameBody::Error { error } => Some(RelayFrame::Error(error)),
        };
        Ok(frame)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayFrame::Delta(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invalid(body: Value) -> String {
        match RelayRequest::from_value(body) {
            Err(RelayError::InvalidRequest(msg)) => msg,
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn accepts_ordered_turns_and_defaults_stream_off() {
        let req = RelayRequest::from_value(
            json!({
                "messages": [
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "content": "hello" },
                    { "role": "user", "content": "how are you?", "id": "extra fields are ignored" }
                ]
            })
        ).unwrap();
        assert!(!req.stream);
        assert_eq!(req.turns, vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("how are you?")]);
    }

    #[test]
    fn reads_stream_flag() {
        let req = RelayRequest::from_value(
            json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": true })
        ).unwrap();
        assert!(req.stream);
    }

    #[test]
    fn rejects_missing_empty_or_non_array_messages() {
        assert_eq!(invalid(json!({})), "Messages array is required");
        assert_eq!(invalid(json!({ "messages": [] })), "Messages array is required");
        assert_eq!(invalid(json!({ "messages": "hello" })), "Messages array is required");
        assert_eq!(invalid(json!({ "messages": { "role": "user" } })), "Messages array is required");
        invalid(json!([{ "role": "user", "content": "hi" }]));
    }

    #[test]
    fn rejects_malformed_turns() {
        let msg = invalid(json!({ "messages": [{ "role": "system", "content": "x" }] }));
        assert!(msg.starts_with("messages[0]"), "{}", msg);
        let msg = invalid(
            json!({ "messages": [{ "role": "user", "content": "ok" }, { "role": "user", "content": 42 }] })
        );
        assert!(msg.starts_with("messages[1]"), "{}", msg);
        invalid(json!({ "messages": [{ "role": "user" }] }));
    }

    #[test]
    fn rejects_non_boolean_stream() {
        assert_eq!(
            invalid(json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": "yes" })),
            "stream must be a boolean"
        );
    }

    #[test]
    fn frames_use_upstream_compatible_shape() {
        assert_eq!(RelayFrame::Done.data(), "[DONE]");
        let delta: Value = serde_json::from_str(&RelayFrame::Delta("Hel\"lo\n".into()).data()).unwrap();
        assert_eq!(delta, json!({ "choices": [{ "delta": { "content": "Hel\"lo\n" } }] }));
        let error: Value = serde_json::from_str(&RelayFrame::Error("boom".into()).data()).unwrap();
        assert_eq!(error, json!({ "error": "boom" }));
    }

    #[test]
    fn decodes_frames() {
        assert_eq!(RelayFrame::decode(" [DONE] ").unwrap(), Some(RelayFrame::Done));
        assert_eq!(
            RelayFrame::decode(r#"{"choices":[{"delta":{"content":"a"}}]}"#).unwrap(),
            Some(RelayFrame::Delta("a".into()))
        );
        assert_eq!(RelayFrame::decode(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
        assert_eq!(RelayFrame::decode(r#"{"choices":[]}"#).unwrap(), None);
        assert_eq!(
            RelayFrame::decode(r#"{"error":"nope"}"#).unwrap(),
            Some(RelayFrame::Error("nope".into()))
        );
        assert!(RelayFrame::decode("{not json").is_err());
    }
}
