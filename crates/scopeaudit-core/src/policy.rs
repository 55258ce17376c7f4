//! Event creation policies
//!
//! A [`CreationPolicy`] decides when an [`AuditScope`](crate::AuditScope)
//! writes its event. The whole state machine is the table below; the scope
//! asks [`CreationPolicy::write_on_start`] and [`CreationPolicy::write_on_end`]
//! and performs whatever write comes back.
//!
//! | policy                          | on start | on end  |
//! |---------------------------------|----------|---------|
//! | `InsertOnEnd`                   | -        | insert  |
//! | `InsertOnStartReplaceOnEnd`     | insert   | replace |
//! | `InsertOnStartInsertOnEnd`      | insert   | insert  |
//! | `Manual`                        | -        | -       |
//!
//! A manual save ignores the table: it inserts while the scope holds no
//! reference and replaces afterwards.

use crate::error::AuditError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// When an audit scope writes its event to the data provider.
///
/// Serialized as snake_case. Deserialization accepts every spelling
/// [`FromStr`] does (`InsertOnEnd`, `insert-on-end`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationPolicy {
    /// Single insert when the scope ends.
    #[default]
    InsertOnEnd,
    /// Insert when the scope starts, replace that record when it ends.
    InsertOnStartReplaceOnEnd,
    /// Insert when the scope starts and insert a second record when it ends.
    InsertOnStartInsertOnEnd,
    /// No automatic writes; the caller saves explicitly.
    Manual,
}

/// A write against the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    /// Create a new record.
    Insert,
    /// Overwrite the record behind the scope's reference.
    Replace,
}

impl CreationPolicy {
    /// All policies, in declaration order.
    pub const ALL: [CreationPolicy; 4] = [
        CreationPolicy::InsertOnEnd,
        CreationPolicy::InsertOnStartReplaceOnEnd,
        CreationPolicy::InsertOnStartInsertOnEnd,
        CreationPolicy::Manual,
    ];

    /// Write performed when the scope starts.
    pub fn write_on_start(self) -> Option<Write> {
        match self {
            CreationPolicy::InsertOnStartReplaceOnEnd | CreationPolicy::InsertOnStartInsertOnEnd => {
                Some(Write::Insert)
            }
            CreationPolicy::InsertOnEnd | CreationPolicy::Manual => None,
        }
    }

    /// Write performed when the scope ends.
    pub fn write_on_end(self) -> Option<Write> {
        match self {
            CreationPolicy::InsertOnEnd | CreationPolicy::InsertOnStartInsertOnEnd => {
                Some(Write::Insert)
            }
            CreationPolicy::InsertOnStartReplaceOnEnd => Some(Write::Replace),
            CreationPolicy::Manual => None,
        }
    }

    /// Write performed by a manual save.
    pub fn write_on_save(has_reference: bool) -> Write {
        if has_reference {
            Write::Replace
        } else {
            Write::Insert
        }
    }

    /// The snake_case name used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            CreationPolicy::InsertOnEnd => "insert_on_end",
            CreationPolicy::InsertOnStartReplaceOnEnd => "insert_on_start_replace_on_end",
            CreationPolicy::InsertOnStartInsertOnEnd => "insert_on_start_insert_on_end",
            CreationPolicy::Manual => "manual",
        }
    }
}

impl fmt::Display for CreationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreationPolicy {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CreationPolicy::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized || p.as_str().replace('_', "") == normalized)
            .ok_or_else(|| AuditError::Configuration(format!("Unknown creation policy: {}", s)))
    }
}

impl<'de> Deserialize<'de> for CreationPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
