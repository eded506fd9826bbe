//! Coercion of raw tool return values into an [`Envelope`].

use serde_json::{Map, Value};

use super::units::Convention;
use crate::{Envelope, FailureKind};

/// A tool's return value, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReturn {
    /// An object carrying both `statusCode` and `body`
    Http {
        /// HTTP-style status code
        status: i64,
        /// Body, possibly JSON text
        body: Value,
    },
    /// Any other object
    Plain(Map<String, Value>),
    /// Anything that is not an object
    Opaque(Value),
}

impl RawReturn {
    /// Classify `value`.
    pub fn decode(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => return Self::Opaque(other),
        };
        let status = map.get("statusCode").and_then(status_code);
        match (status, map.contains_key("body")) {
            (Some(status), true) => Self::Http {
                status,
                body: map.remove("body").unwrap_or(Value::Null),
            },
            _ => Self::Plain(map),
        }
    }

    /// The envelope this return value stands for, given the convention that
    /// produced it.
    pub fn into_envelope(self, convention: Convention) -> Envelope {
        match self {
            Self::Http { status, body } => {
                let body = parse_body(body);
                if status == 200 {
                    Envelope::success(body)
                } else {
                    Envelope::failure(FailureKind::ToolReported, body)
                }
            }
            Self::Plain(mut map) => match map.get("success").map(is_truthy) {
                Some(false) => {
                    let error = map.remove("error").unwrap_or(Value::Object(map));
                    Envelope::failure(FailureKind::ToolReported, error)
                }
                Some(true) if map.len() == 2 && map.contains_key("result") => {
                    Envelope::success(map.remove("result").unwrap_or(Value::Null))
                }
                _ => Envelope::success(Value::Object(map)),
            },
            Self::Opaque(value) if convention == Convention::EventHandler => Envelope::failure(
                FailureKind::InvalidReturnShape,
                format!("handler returned {}, expected an object", type_name(&value)),
            ),
            Self::Opaque(value) => Envelope::success(value),
        }
    }
}

/// Normalize `value` returned under `convention`.
pub fn normalize(value: Value, convention: Convention) -> Envelope {
    RawReturn::decode(value).into_envelope(convention)
}

fn status_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Body text that looks like JSON is parsed; anything else is kept as is.
fn parse_body(body: Value) -> Value {
    match body {
        Value::String(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).unwrap_or(Value::String(text))
            } else {
                Value::String(text)
            }
        }
        other => other,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
