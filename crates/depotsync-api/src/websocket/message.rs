// Wire message shapes for the shared socket.
//
// Inbound frames are JSON objects with optional `id` and `type` fields;
// everything else is opaque payload. Replies to correlated requests are
// decoded once into `Reply` so callers never re-inspect the type tag.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::Error;

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    id: Option<String>,
    kind: Option<String>,
    body: Value,
}

impl InboundMessage {
    /// Parse a raw text frame. Anything but a JSON object is rejected.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let body: Value = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })?;
        Self::from_value(body).map_err(|body| Error::Deserialization {
            message: "expected a JSON object".into(),
            body: body.to_string(),
        })
    }

    /// Wrap an already-decoded value. Returns the value back if it is not an object.
    pub fn from_value(body: Value) -> Result<Self, Value> {
        let Value::Object(ref map) = body else {
            return Err(body);
        };
        let id = string_field(map, "id");
        let kind = string_field(map, "type");
        Ok(Self { id, kind, body })
    }

    /// Correlation id echoed by the server, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Message `type` tag, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The full message object, including `id` and `type`.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

impl Serialize for InboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(String::from)
}

// ── Reply ────────────────────────────────────────────────────────────

/// A correlated reply, decoded at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok(InboundMessage),
    Err(InboundMessage),
}

impl Reply {
    /// Classify a message: a `type` equal to `error_type` marks an error reply.
    pub fn decode(message: InboundMessage, error_type: &str) -> Self {
        if message.kind() == Some(error_type) {
            Self::Err(message)
        } else {
            Self::Ok(message)
        }
    }

    pub fn into_result(self) -> Result<InboundMessage, Error> {
        match self {
            Self::Ok(msg) => Ok(msg),
            Self::Err(msg) => Err(Error::ErrorResponse(Box::new(msg))),
        }
    }
}

// ── Outbound helpers ─────────────────────────────────────────────────

/// Serialize a payload into a JSON object, rejecting scalars and arrays.
pub(crate) fn to_object(payload: &impl Serialize) -> Result<Map<String, Value>, Error> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
