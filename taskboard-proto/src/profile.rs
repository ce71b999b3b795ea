//! User identity and profile directory rows.

use serde::{Deserialize, Serialize};

/// Display name used when a profile has none set.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Display name used for identifiers missing from the directory.
pub const UNKNOWN_USER_NAME: &str = "Unknown user";

/// Opaque identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A row of the profile directory.
///
/// Only static fields live here. Online status is derived from presence
/// membership and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Owning user.
    pub id: UserId,
    /// Chosen display name, if the user has set one.
    #[serde(default, rename = "username")]
    pub display_name: Option<String>,
}

impl Profile {
    /// Creates a profile with the given display name.
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(display_name.into()),
        }
    }

    /// Returns the display name, falling back to [`ANONYMOUS_NAME`]
    /// when unset or blank.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => ANONYMOUS_NAME,
        }
    }
}
