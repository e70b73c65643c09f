use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::hub::HubError;

/// Routing key carried by every event message
///
/// The set is closed: adding a category means adding a variant here and
/// nothing else, since validity, parsing and the wire form are all derived
/// from the enum.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventType {
    /// Every client is subscribed to this type and cannot leave it
    #[default]
    Global,
    System,
    Vm,
    Host,
    Pdfm,
    Health,
    Stats,
    Logs,
    Orchestrator,
}

impl EventType {
    /// Returns true if `raw` is exactly the wire tag of one of the variants
    pub fn is_valid(raw: &str) -> bool {
        EventType::iter().any(|event_type| event_type.as_ref() == raw)
    }

    /// All variants in declaration order
    pub fn all() -> Vec<EventType> {
        EventType::iter().collect()
    }
}

/// Outcome of parsing a list of user-supplied type names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEventTypes {
    pub valid: Vec<EventType>,
    pub invalid: Vec<String>,
}

impl ParsedEventTypes {
    /// Fails if nothing was supplied or any name was rejected
    pub fn into_result(self) -> Result<Vec<EventType>, HubError> {
        if self.valid.is_empty() && self.invalid.is_empty() {
            return Err(HubError::Validation("no event types provided".to_string()));
        }

        if !self.invalid.is_empty() {
            let valid_types: Vec<String> = EventType::iter().map(|t| t.to_string()).collect();
            return Err(HubError::Validation(format!(
                "invalid event type(s): {}. Valid types are: {}",
                self.invalid.join(", "),
                valid_types.join(", ")
            )));
        }

        Ok(self.valid)
    }
}

/// Parses type names case-insensitively, ignoring surrounding whitespace
///
/// Blank entries (e.g. from splitting an empty query parameter) are skipped.
/// Duplicates are kept only once, in first-seen order.
pub fn parse_event_types<S: AsRef<str>>(raw: &[S]) -> ParsedEventTypes {
    let mut parsed = ParsedEventTypes::default();

    for name in raw {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }

        match name.parse::<EventType>() {
            Ok(event_type) => {
                if !parsed.valid.contains(&event_type) {
                    parsed.valid.push(event_type);
                }
            }
            Err(_) => parsed.invalid.push(name.to_string()),
        }
    }

    parsed
}
