//! Storage backends.
//!
//! Four engine adapters implement one fixed contract:
//! - **MongoDB** (document): everything pushed down as compound queries
//! - **Cassandra/Scylla** (wide column): bounded scans plus in-process matching
//! - **Neo4j** (graph): traversal predicates, relationships as edges
//! - **Redis** (key-value): hashes plus hand-maintained secondary indexes
//!
//! An in-memory reference backend implements the same contract for tests and
//! as executable documentation of the expected semantics.

// Allow cast precision loss for aggregate arithmetic where exact precision is
// not critical.
#![allow(clippy::cast_precision_loss)]

pub mod cassandra;
pub mod memory;
pub mod mongo;
pub mod neo4j;
pub mod redis;
mod traits;

pub use traits::CatalogBackend;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Identifies one of the four storage engines.
///
/// Doubles as the key of per-backend result maps and as the target-selector
/// token the facade passes through, so dispatch is a fixed lookup instead of
/// string branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// MongoDB document store.
    Mongo,
    /// Cassandra-compatible wide-column store.
    Cassandra,
    /// Neo4j graph store.
    Neo4j,
    /// Redis key-value store.
    Redis,
}

impl BackendKind {
    /// All four engines, in canonical order.
    pub const ALL: [Self; 4] = [Self::Mongo, Self::Cassandra, Self::Neo4j, Self::Redis];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mongo => "mongo",
            Self::Cassandra => "cassandra",
            Self::Neo4j => "neo4j",
            Self::Redis => "redis",
        }
    }

    /// Parses a backend name.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for unknown names. `"all"` is not a backend;
    /// see [`crate::Target`].
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "cassandra" | "scylla" => Ok(Self::Cassandra),
            "neo4j" => Ok(Self::Neo4j),
            "redis" => Ok(Self::Redis),
            other => Err(Error::InvalidInput(format!("unknown backend '{other}'"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("mongo").ok(), Some(BackendKind::Mongo));
        assert_eq!(BackendKind::parse("MongoDB").ok(), Some(BackendKind::Mongo));
        assert_eq!(BackendKind::parse("scylla").ok(), Some(BackendKind::Cassandra));
        assert!(BackendKind::parse("all").is_err());
        assert!(BackendKind::parse("sqlite").is_err());
    }

    #[test]
    fn test_backend_kind_order_is_stable() {
        let names: Vec<&str> = BackendKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["mongo", "cassandra", "neo4j", "redis"]);
    }
}
