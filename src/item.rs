//! The opaque record carried through the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered unit of work.
///
/// Items have no identity key: two items with equal fields are
/// interchangeable, and only membership in a queue or a partition matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub foo: String,
    pub bar: i64,
    pub baz: DateTime<Utc>,
}

impl WorkItem {
    /// Create a new item
    pub fn new(foo: impl Into<String>, bar: i64, baz: DateTime<Utc>) -> Self {
        Self {
            foo: foo.into(),
            bar,
            baz,
        }
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}@{}", self.foo, self.bar, self.baz.timestamp_millis())
    }
}
