//! Whole-session state as exchanged with the outside world.
//!
//! The persisted form is a small JSON object:
//!
//! ```json
//! { "seed": "k3j9x2aa", "players": [ { "id": "player-3fa2", ... } ] }
//! ```

use crate::error::StateError;
use crate::record::PlayerRecord;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Seed plus roster, the state a session can be rebuilt from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Seed text; numeric seeds are used as-is, anything else is hashed
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_seed")]
    pub seed: Option<String>,
    
    #[serde(default, deserialize_with = "lenient_players")]
    pub players: Vec<PlayerRecord>,
}

impl SessionState {
    /// Parses session state text.
    pub fn from_json(text: &str) -> Result<Self, StateError> {
        Ok(serde_json::from_str(text)?)
    }
    
    /// Renders the state as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    
    /// The numeric seed this state asks for, if it names one.
    pub fn seed_value(&self) -> Option<u64> {
        self.seed.as_deref().map(seed_from_text)
    }
}

/// Turns seed text into a PRNG seed.
///
/// Decimal text is taken literally; other text is hashed with 64-bit
/// FNV-1a so that short random ids make usable, stable seeds.
pub fn seed_from_text(text: &str) -> u64 {
    let text = text.trim();
    text.parse::<u64>().unwrap_or_else(|_| {
        text.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
            (hash ^ byte as u64).wrapping_mul(0x100000001b3)
        })
    })
}

fn lenient_seed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_players<'de, D>(deserializer: D) -> Result<Vec<PlayerRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    // Entries that are not records at all are skipped.
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}
