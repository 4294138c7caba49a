//! External player records.
//!
//! This is the shape players take outside the core (a shareable URL, a
//! hash-field text blob, a JSON file). External state is not trusted to be
//! well typed: numbers may arrive as strings, booleans as `"true"` /
//! `"false"`, fields may be missing. Ingestion never fails on any of that:
//!
//! - a missing field is `None` (a merge leaves the live value alone, a new
//!   player gets the default)
//! - a present field is coerced; anything non-numeric becomes `0`
//! - the evaluation window is never read from a record

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One player as persisted or exchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_label")]
    pub label: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_nested")]
    pub position: Option<RecordPosition>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_nested")]
    pub ui_state: Option<UiState>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub sample_index: Option<f64>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub pan: Option<f64>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub amp: Option<f64>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub evaluation_window_size_in_events: Option<f64>,
    
    /// Accepts a list, or the older single `responseStrategyName` string
    #[serde(
        default,
        alias = "responseStrategyName",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_names"
    )]
    pub response_strategy_names: Option<Vec<String>>,
    
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub tick_secs: Option<f64>,
    
    /// Busy-gate, in seconds of session time
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub can_next_respond_at_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordPosition {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UiState {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub selected: bool,
}

impl PlayerRecord {
    /// A record carrying only an id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Coerces a JSON value to a finite number, defaulting to 0.
pub fn coerce_number(value: &Value) -> f64 {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    number.filter(|n| n.is_finite()).unwrap_or(0.0)
}

/// Coerces a JSON value to a boolean. Only `true` and `"true"` are true.
pub fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(coerce_number(&value)))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_number(&value))
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_flag(&value))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// A nested object that does not have the expected shape counts as missing.
fn lenient_nested<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_names<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(name) => Some(vec![name]),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}
