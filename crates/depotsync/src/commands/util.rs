//! Shared helpers for command handlers.

use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};

use crate::cli::PayloadArgs;
use crate::error::CliError;

/// Read a file, or stdin when the path is `-`.
pub fn read_input(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Parse `text` as a JSON object; `field` names the source in errors.
pub fn parse_object(field: &str, text: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CliError::Validation {
            field: field.into(),
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(CliError::Validation {
            field: field.into(),
            reason: format!("invalid JSON: {e}"),
        }),
    }
}

/// The payload given inline or via `--file`.
pub fn read_payload(args: &PayloadArgs) -> Result<Map<String, Value>, CliError> {
    match (&args.payload, &args.file) {
        (Some(inline), _) => parse_object("payload", inline),
        (None, Some(path)) => parse_object("file", &read_input(path)?),
        (None, None) => Err(CliError::Validation {
            field: "payload".into(),
            reason: "provide a JSON object or --file".into(),
        }),
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
