//! Row-level change events delivered by a collection's change feed.
//!
//! Events follow the backend's payload shape:
//! `{"eventType": "INSERT" | "UPDATE" | "DELETE", "new": {..}, "old": {..}}`.
//! Inserts and updates carry the row in `new`; deletes carry at least the
//! key in `old`. Delivery is at-least-once and ordered per row only.

use serde::{Deserialize, Serialize};

/// Kind of row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A row was created.
    Insert,
    /// Some columns of a row changed.
    Update,
    /// A row was removed.
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One change to a row of type `R`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent<R> {
    /// What happened.
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    /// Row after the change (inserts and updates).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<R>,
    /// Row before the change (deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<R>,
}

impl<R> ChangeEvent<R> {
    /// An insert carrying the new row.
    pub const fn insert(row: R) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        }
    }

    /// An update carrying the changed columns.
    pub const fn update(row: R) -> Self {
        Self {
            kind: ChangeKind::Update,
            new: Some(row),
            old: None,
        }
    }

    /// A delete carrying the removed row's key.
    pub const fn delete(row: R) -> Self {
        Self {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(row),
        }
    }
}
