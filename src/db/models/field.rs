//! Field definitions: the typed input slots of a form.
//!
//! Field settings are not carried around as an open JSON blob: they are
//! parsed into a sum type keyed by the field type once at the API boundary,
//! and serialized back to the wire shape (camelCase) for storage and output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::sanitize::sanitize_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Email,
    Number,
    Select,
    Checkbox,
    Radio,
    Date,
    Time,
    File,
    Rating,
    Nps,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Email => "EMAIL",
            FieldType::Number => "NUMBER",
            FieldType::Select => "SELECT",
            FieldType::Checkbox => "CHECKBOX",
            FieldType::Radio => "RADIO",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::File => "FILE",
            FieldType::Rating => "RATING",
            FieldType::Nps => "NPS",
        }
    }

    pub fn parse(s: &str) -> Option<FieldType> {
        match s {
            "TEXT" => Some(FieldType::Text),
            "EMAIL" => Some(FieldType::Email),
            "NUMBER" => Some(FieldType::Number),
            "SELECT" => Some(FieldType::Select),
            "CHECKBOX" => Some(FieldType::Checkbox),
            "RADIO" => Some(FieldType::Radio),
            "DATE" => Some(FieldType::Date),
            "TIME" => Some(FieldType::Time),
            "FILE" => Some(FieldType::File),
            "RATING" => Some(FieldType::Rating),
            "NPS" => Some(FieldType::Nps),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("settings must be a JSON object")]
    NotAnObject,
    #[error("options is required for choice fields and must be non-empty")]
    MissingOptions,
    #[error("min must not exceed max")]
    InvalidRange,
}

/// Settings common to free-input fields (text, email, date, time, file).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceSettings {
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

/// Per-type field settings, validated once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSettings {
    Text(TextSettings),
    Email(TextSettings),
    Date(TextSettings),
    Time(TextSettings),
    File(TextSettings),
    Number(NumberSettings),
    Select(ChoiceSettings),
    Checkbox(ChoiceSettings),
    Radio(ChoiceSettings),
    Rating(ScaleSettings),
    Nps(ScaleSettings),
}

fn string_value(raw: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(sanitize_string)
        .filter(|s| !s.is_empty())
}

fn f64_value(raw: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    raw.get(key).and_then(Value::as_f64)
}

fn i64_value(raw: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    raw.get(key).and_then(Value::as_i64)
}

fn object_value(
    raw: &serde_json::Map<String, Value>,
    key: &str,
) -> Option<serde_json::Map<String, Value>> {
    raw.get(key).and_then(Value::as_object).cloned()
}

fn options_value(raw: &serde_json::Map<String, Value>) -> Result<Vec<String>, SettingsError> {
    let options: Vec<String> = raw
        .get("options")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(sanitize_string)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if options.is_empty() {
        return Err(SettingsError::MissingOptions);
    }
    Ok(options)
}

impl FieldSettings {
    /// Parse raw JSON settings for a field of the given type. Unknown keys
    /// and wrongly-typed values are dropped; strings are sanitized.
    pub fn parse(field_type: FieldType, raw: Option<&Value>) -> Result<Self, SettingsError> {
        let empty = serde_json::Map::new();
        let raw = match raw {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(SettingsError::NotAnObject),
        };

        let text = |raw: &serde_json::Map<String, Value>| TextSettings {
            placeholder: string_value(raw, "placeholder"),
            help_text: string_value(raw, "helpText"),
            validation: object_value(raw, "validation"),
        };

        match field_type {
            FieldType::Text => Ok(FieldSettings::Text(text(raw))),
            FieldType::Email => Ok(FieldSettings::Email(text(raw))),
            FieldType::Date => Ok(FieldSettings::Date(text(raw))),
            FieldType::Time => Ok(FieldSettings::Time(text(raw))),
            FieldType::File => Ok(FieldSettings::File(text(raw))),
            FieldType::Number => {
                let min = f64_value(raw, "min");
                let max = f64_value(raw, "max");
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return Err(SettingsError::InvalidRange);
                    }
                }
                Ok(FieldSettings::Number(NumberSettings {
                    placeholder: string_value(raw, "placeholder"),
                    help_text: string_value(raw, "helpText"),
                    min,
                    max,
                }))
            }
            FieldType::Select | FieldType::Checkbox | FieldType::Radio => {
                let settings = ChoiceSettings {
                    options: options_value(raw)?,
                    help_text: string_value(raw, "helpText"),
                };
                Ok(match field_type {
                    FieldType::Select => FieldSettings::Select(settings),
                    FieldType::Checkbox => FieldSettings::Checkbox(settings),
                    _ => FieldSettings::Radio(settings),
                })
            }
            FieldType::Rating => {
                let min = i64_value(raw, "min");
                // Rating scales render 1..max; default to the usual 5 stars
                let max = i64_value(raw, "max").or(Some(5));
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return Err(SettingsError::InvalidRange);
                    }
                }
                Ok(FieldSettings::Rating(ScaleSettings {
                    min,
                    max,
                    help_text: string_value(raw, "helpText"),
                }))
            }
            FieldType::Nps => {
                // NPS is a fixed 0..10 scale regardless of what was sent
                Ok(FieldSettings::Nps(ScaleSettings {
                    min: Some(0),
                    max: Some(10),
                    help_text: string_value(raw, "helpText"),
                }))
            }
        }
    }

    /// Wire/storage representation (camelCase keys, no tag).
    pub fn to_json(&self) -> Value {
        match self {
            FieldSettings::Text(s)
            | FieldSettings::Email(s)
            | FieldSettings::Date(s)
            | FieldSettings::Time(s)
            | FieldSettings::File(s) => serde_json::to_value(s).unwrap_or(Value::Null),
            FieldSettings::Number(s) => serde_json::to_value(s).unwrap_or(Value::Null),
            FieldSettings::Select(s) | FieldSettings::Checkbox(s) | FieldSettings::Radio(s) => {
                serde_json::to_value(s).unwrap_or(Value::Null)
            }
            FieldSettings::Rating(s) | FieldSettings::Nps(s) => {
                serde_json::to_value(s).unwrap_or(Value::Null)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormField {
    pub id: String,
    pub form_id: String,
    pub field_type: String,
    pub label: String,
    pub required: bool,
    pub position: i64,
    /// Settings JSON stored as TEXT, already validated for the field type
    pub settings: Option<String>,
    pub created_at: String,
}

impl FormField {
    /// Parse stored settings JSON; missing or corrupt settings become null.
    pub fn settings_json(&self) -> Value {
        self.settings
            .as_ref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(Value::Null)
    }
}

/// Response DTO for a field: typed enum name, parsed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResponse {
    pub id: String,
    pub form_id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    pub required: bool,
    pub order: i64,
    pub settings: Value,
    pub created_at: String,
}

impl From<FormField> for FieldResponse {
    fn from(field: FormField) -> Self {
        let settings = field.settings_json();
        Self {
            id: field.id,
            form_id: field.form_id,
            field_type: field.field_type,
            label: field.label,
            required: field.required,
            order: field.position,
            settings,
            created_at: field.created_at,
        }
    }
}

// DTOs for API

#[derive(Debug, Deserialize)]
pub struct CreateFieldRequest {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    pub order: i64,
    #[serde(default)]
    pub settings: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFieldRequest {
    pub label: Option<String>,
    pub required: Option<bool>,
    pub order: Option<i64>,
    pub settings: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_type_round_trips_through_strings() {
        for ft in [
            FieldType::Text,
            FieldType::Email,
            FieldType::Number,
            FieldType::Select,
            FieldType::Checkbox,
            FieldType::Radio,
            FieldType::Date,
            FieldType::Time,
            FieldType::File,
            FieldType::Rating,
            FieldType::Nps,
        ] {
            assert_eq!(FieldType::parse(ft.as_str()), Some(ft));
        }
        assert_eq!(FieldType::parse("BOGUS"), None);
    }

    #[test]
    fn text_settings_keep_known_keys_and_drop_the_rest() {
        let raw = json!({
            "placeholder": "Digite seu nome",
            "helpText": "Nome completo",
            "surprise": true,
            "min": "not-a-number"
        });
        let parsed = FieldSettings::parse(FieldType::Text, Some(&raw)).unwrap();
        match &parsed {
            FieldSettings::Text(s) => {
                assert_eq!(s.placeholder.as_deref(), Some("Digite seu nome"));
                assert_eq!(s.help_text.as_deref(), Some("Nome completo"));
                assert!(s.validation.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        let out = parsed.to_json();
        assert!(out.get("surprise").is_none());
    }

    #[test]
    fn choice_fields_require_options() {
        let err = FieldSettings::parse(FieldType::Select, Some(&json!({}))).unwrap_err();
        assert_eq!(err, SettingsError::MissingOptions);

        let parsed =
            FieldSettings::parse(FieldType::Radio, Some(&json!({"options": ["Sim", "Não"]})))
                .unwrap();
        match parsed {
            FieldSettings::Radio(s) => assert_eq!(s.options, vec!["Sim", "Não"]),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn number_range_is_validated() {
        let err =
            FieldSettings::parse(FieldType::Number, Some(&json!({"min": 10, "max": 1})))
                .unwrap_err();
        assert_eq!(err, SettingsError::InvalidRange);
    }

    #[test]
    fn rating_defaults_to_five_and_nps_is_fixed() {
        let rating = FieldSettings::parse(FieldType::Rating, None).unwrap();
        match rating {
            FieldSettings::Rating(s) => assert_eq!(s.max, Some(5)),
            other => panic!("unexpected variant: {:?}", other),
        }

        let nps = FieldSettings::parse(FieldType::Nps, Some(&json!({"max": 99}))).unwrap();
        match nps {
            FieldSettings::Nps(s) => {
                assert_eq!(s.min, Some(0));
                assert_eq!(s.max, Some(10));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn settings_strings_are_sanitized() {
        let raw = json!({"placeholder": "<b>hello</b> world"});
        let parsed = FieldSettings::parse(FieldType::Text, Some(&raw)).unwrap();
        match parsed {
            FieldSettings::Text(s) => assert_eq!(s.placeholder.as_deref(), Some("hello world")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn non_object_settings_are_rejected() {
        let err = FieldSettings::parse(FieldType::Text, Some(&json!([1, 2]))).unwrap_err();
        assert_eq!(err, SettingsError::NotAnObject);
    }
}
