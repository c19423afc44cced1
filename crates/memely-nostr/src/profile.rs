//! Profile metadata codec
//!
//! The content of a kind-0 event is a JSON object of profile fields.
//! Unknown keys are ignored so newer clients can add fields freely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display name used when no metadata could be fetched for an author.
pub const PLACEHOLDER_NAME: &str = "Memely User";

/// Errors from parsing profile metadata content.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid metadata content: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parsed profile fields from a kind-0 event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Bio text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,

    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Verified identifier (user@domain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,

    /// Lightning address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ProfileMetadata {
    /// Parse from the content string of a kind-0 event.
    pub fn from_content(content: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Synthesized profile for authors with no fetched metadata.
    pub fn placeholder() -> Self {
        Self {
            name: Some(PLACEHOLDER_NAME.to_string()),
            ..Self::default()
        }
    }

    /// Whether this record is the synthesized placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.name.as_deref() == Some(PLACEHOLDER_NAME)
    }

    /// Preferred name for display: display_name, then name.
    pub fn best_name(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.name.as_deref())
    }
}
