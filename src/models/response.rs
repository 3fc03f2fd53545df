use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured error payload sent by the server in place of a return value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawErrorPayload")]
pub struct ErrorPayload {
    pub exception: bool,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backtrace: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorPayload>>,
}

/// Payload as it arrives; servers name the kind `kind`, `type`, or both
#[derive(Deserialize)]
struct RawErrorPayload {
    exception: bool,
    kind: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    backtrace: Vec<String>,
    #[serde(default)]
    cause: Option<Box<ErrorPayload>>,
}

impl TryFrom<RawErrorPayload> for ErrorPayload {
    type Error = String;

    fn try_from(raw: RawErrorPayload) -> Result<Self, Self::Error> {
        let kind = raw
            .kind
            .or(raw.type_name)
            .ok_or_else(|| "error payload has neither `kind` nor `type`".to_string())?;
        Ok(Self {
            exception: raw.exception,
            kind,
            message: raw.message,
            backtrace: raw.backtrace,
            cause: raw.cause,
        })
    }
}

impl ErrorPayload {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception: true,
            kind: kind.into(),
            message: message.into(),
            backtrace: Vec::new(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: ErrorPayload) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Recognize an error payload: an object flagged `exception: true` with a string kind
    fn detect(obj: &Value) -> Option<Self> {
        let map = obj.as_object()?;
        if map.get("exception").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        serde_json::from_value(obj.clone()).ok()
    }
}

/// Decoded contents of a response frame
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Error(ErrorPayload),
}

/// One decoded response, built once per completed exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    reply: Reply,
}

impl Response {
    pub fn value(value: Value) -> Self {
        Self {
            reply: Reply::Value(value),
        }
    }

    pub fn error(payload: ErrorPayload) -> Self {
        Self {
            reply: Reply::Error(payload),
        }
    }

    /// Classify a decoded object. Anything that is not a recognizable error
    /// payload is a plain return value.
    pub fn from_object(obj: Value) -> Self {
        match ErrorPayload::detect(&obj) {
            Some(payload) => Self::error(payload),
            None => Self::value(obj),
        }
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    pub fn into_reply(self) -> Reply {
        self.reply
    }

    pub fn is_error(&self) -> bool {
        matches!(self.reply, Reply::Error(_))
    }
}

/// Wire representation of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub obj: Value,
}

impl ResponseFrame {
    pub fn new(obj: Value) -> Self {
        Self { obj }
    }

    pub fn into_response(self) -> Response {
        Response::from_object(self.obj)
    }
}
