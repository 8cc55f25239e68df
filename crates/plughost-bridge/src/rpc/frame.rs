use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound or outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Error half of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Answer to a [`RequestFrame`] with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFrame),
}

impl Frame {
    /// Encode as a single `\n`-terminated line.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_and_response_are_distinguished() {
        let frame = Frame::decode(r#"{"id":1,"method":"storage.get","params":{"key":"a"}}"#).unwrap();
        assert!(matches!(frame, Frame::Request(RequestFrame { id: 1, .. })));

        let frame = Frame::decode(r#"{"id":1,"result":{"ok":true}}"#).unwrap();
        match frame {
            Frame::Response(resp) => {
                assert_eq!(resp.result, json!({"ok": true}));
                assert!(resp.error.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let frame = Frame::decode(r#"{"id":7,"error":{"code":"permission_denied","message":"permission denied"}}"#).unwrap();
        match frame {
            Frame::Response(resp) => {
                assert_eq!(resp.result, Value::Null);
                assert_eq!(resp.error.unwrap().code, "permission_denied");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_encoded_frame_is_one_line() {
        let frame = Frame::Request(RequestFrame {
            id: 3,
            method: "handle_request".into(),
            params: json!({"path": "a\nb"}),
        });
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_missing_params_default_to_null() {
        let frame = Frame::decode(r#"{"id":2,"method":"cleanup"}"#).unwrap();
        assert!(matches!(frame, Frame::Request(RequestFrame { params: Value::Null, .. })));
    }
}
