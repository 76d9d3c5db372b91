//! Row types for the test table.
//!
//! The table is owned by whoever runs the generator. It must have the
//! columns `id`, `created`, `updated`, `initial_value` and
//! `current_value`.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::error::LoadgenError;

/// A row to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRow {
    /// Creation timestamp.
    pub created: DateTime<FixedOffset>,
    /// Last update timestamp, equal to `created` on insert.
    pub updated: DateTime<FixedOffset>,
    /// Value at insert time.
    pub initial_value: i64,
    /// Value bumped by every update.
    pub current_value: i64,
}

impl NewRow {
    /// Row number `i` of an insert run: both values are `i` and both
    /// timestamps are `now`.
    #[must_use]
    pub fn numbered(i: i64, now: DateTime<FixedOffset>) -> Self {
        Self {
            created: now,
            updated: now,
            initial_value: i,
            current_value: i,
        }
    }
}

/// The fields of an existing row that an update pass needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestRow {
    /// Primary key.
    pub id: i64,
    /// Value before this pass.
    pub current_value: i64,
}

/// A validated table name, `name` or `schema.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    parts: Vec<String>,
}

impl TableName {
    /// Validates `raw`.
    ///
    /// Each part must start with an ASCII letter or underscore and contain
    /// only ASCII letters, digits and underscores. Parts are folded to
    /// lower case, as PostgreSQL does for unquoted identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, LoadgenError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(LoadgenError::InvalidArgument(format!(
                "table {raw:?} must be `name` or `schema.name` made of letters, digits and underscores"
            )));
        }
        Ok(Self {
            parts: parts.iter().map(|p| p.to_ascii_lowercase()).collect(),
        })
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Renders the quoted form usable in SQL, e.g. `"public"."readings"`.
impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.parts.iter().map(|p| format!("\"{p}\"")).collect();
        f.write_str(&quoted.join("."))
    }
}
