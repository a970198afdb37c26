use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Transport-level recipient: the digits of a contact number followed by the
/// transport's fixed domain suffix, e.g. `923001234567@c.us`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    pub fn normalize(raw: &str, suffix: &str) -> Result<Self, ValidationError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(ValidationError::EmptyRecipient(raw.to_string()));
        }
        Ok(Self(format!("{digits}{suffix}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
