use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptErrorInfo {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

/// Outcome of an in-page script evaluation as reported by the renderer:
/// `{"success":true,"type":"string","result":..,"stringResult":..}` or
/// `{"success":false,"error":{"message":..,"stack":..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub success: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScriptErrorInfo>,
}

impl ScriptResult {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn ok(value: Value) -> Self {
        let value_type = match &value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        let string_result = value.as_str().map(str::to_owned);
        Self {
            success: true,
            value_type: Some(value_type.to_string()),
            result: value,
            string_result,
            error: None,
        }
    }

    pub fn undefined() -> Self {
        Self {
            success: true,
            value_type: Some("undefined".to_string()),
            result: Value::Null,
            string_result: None,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            value_type: None,
            result: Value::Null,
            string_result: None,
            error: Some(ScriptErrorInfo {
                message: message.into(),
                stack: String::new(),
            }),
        }
    }

    /// Serialized in the renderer wire format.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"message":"Unserializable result","stack":""}}"#
                .to_string()
        })
    }

    /// The result as text: the raw string for string results, JSON otherwise.
    pub fn as_text(&self) -> String {
        match &self.string_result {
            Some(s) => s.clone(),
            None => self.result.to_string(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}
