//! Response models: one public submission's set of field values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormResponse {
    pub id: String,
    pub form_id: String,
    /// JSON array of {fieldId, value} entries, stored as TEXT
    pub data: String,
    pub ip: Option<String>,
    /// JSON object, e.g. {"durationMs": 1234, "completed": true}
    pub metadata: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

/// One answered field within a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub field_id: String,
    pub value: Value,
}

impl FormResponse {
    /// Parse the stored data array, dropping entries without a string fieldId.
    pub fn entries(&self) -> Vec<ResponseEntry> {
        serde_json::from_str::<Value>(&self.data)
            .map(|v| parse_entries(&v))
            .unwrap_or_default()
    }

    pub fn metadata_json(&self) -> Option<Value> {
        self.metadata
            .as_ref()
            .and_then(|s| serde_json::from_str(s).ok())
    }
}

/// Extract well-formed {fieldId, value} entries from a raw JSON value.
/// Anything that is not an object with a string `fieldId` is dropped.
pub fn parse_entries(raw: &Value) -> Vec<ResponseEntry> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let field_id = obj.get("fieldId")?.as_str()?.to_string();
            let value = obj.get("value").cloned().unwrap_or(Value::Null);
            Some(ResponseEntry { field_id, value })
        })
        .collect()
}

/// Human rendering of a submitted value, shared by exports and filtering.
/// Returns None for null/absent values so callers pick their own blank.
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("Sim".to_string()),
        Value::Bool(false) => Some("Não".to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| render_value(v).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Owner-facing view of a stored response with parsed JSON payloads.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOut {
    pub id: String,
    pub form_id: String,
    pub data: Vec<ResponseEntry>,
    pub ip: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: String,
}

impl From<FormResponse> for ResponseOut {
    fn from(response: FormResponse) -> Self {
        let data = response.entries();
        let metadata = response.metadata_json();
        Self {
            id: response.id,
            form_id: response.form_id,
            data,
            ip: response.ip,
            metadata,
            created_at: response.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseListOut {
    pub items: Vec<ResponseOut>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

// DTOs for API

/// Raw submission body; `fields` is validated by hand so malformed entries
/// can be dropped instead of failing the whole request.
#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    #[serde(default)]
    pub fields: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_entries_drops_malformed_items() {
        let raw = json!([
            {"fieldId": "f1", "value": "hello"},
            {"value": "no field id"},
            {"fieldId": 42, "value": "numeric id"},
            "not an object",
            {"fieldId": "f2"}
        ]);

        let entries = parse_entries(&raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].field_id, "f1");
        assert_eq!(entries[0].value, json!("hello"));
        assert_eq!(entries[1].field_id, "f2");
        assert_eq!(entries[1].value, Value::Null);
    }

    #[test]
    fn parse_entries_of_non_array_is_empty() {
        assert!(parse_entries(&json!({"fieldId": "f1"})).is_empty());
        assert!(parse_entries(&json!("text")).is_empty());
    }

    #[test]
    fn render_value_localizes_booleans_and_joins_arrays() {
        assert_eq!(render_value(&json!(true)).as_deref(), Some("Sim"));
        assert_eq!(render_value(&json!(false)).as_deref(), Some("Não"));
        assert_eq!(render_value(&json!(null)), None);
        assert_eq!(render_value(&json!(4.5)).as_deref(), Some("4.5"));
        assert_eq!(
            render_value(&json!(["a", "b", 3])).as_deref(),
            Some("a, b, 3")
        );
    }
}
