//! # Polystore
//!
//! A comparative polyglot-persistence demo: one media-catalog contract
//! (titles, people, appearance credits) executed against four storage
//! engines with fundamentally different data models.
//!
//! ## Features
//!
//! - Fixed operation contract implemented by four adapters
//!   (MongoDB, Cassandra, Neo4j, Redis) plus an in-memory reference backend
//! - Canonical filter vocabulary translated per engine: fully pushed-down
//!   compound queries, bounded scans with in-process matching, traversal
//!   predicates, and secondary-index intersection
//! - Concurrent fan-out across all backends with independent per-backend
//!   success/failure reporting
//! - Bulk loading from tab-separated sources with row-level error collection
//!
//! ## Example
//!
//! ```rust,ignore
//! use polystore::{Catalog, Target, TitleFilter};
//!
//! let catalog = Catalog::connect(&config).await?;
//! let filter = TitleFilter::new().with_genre("Action").with_rating_min(8.0);
//! let results = catalog
//!     .search_titles(Target::All, &filter, Sort::default(), 50)
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use serde::Serialize;
use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod query;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::PolystoreConfig;
pub use models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, SortDirection,
    SortField, Title, TitleCategory, TitleFilter, TitleId, YearCount,
};
pub use query::SearchPolicy;
pub use services::{BulkLoader, Catalog, FanoutResult, LoadReport, Target};
pub use storage::{BackendKind, CatalogBackend};

/// Error type for polystore operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations. The taxonomy is shared by every backend adapter: each
/// adapter maps its native driver errors onto these variants at the point of
/// capture, so nothing downstream ever inspects an engine-specific error.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | Lookup, update, or delete misses the canonical id |
/// | `AlreadyExists` | Insert collides with an existing canonical id |
/// | `InvalidInput` | Malformed entity, filter value, or field update |
/// | `Unavailable` | Connection, transport, or timeout failure |
/// | `Translation` | Predicate or sort field an adapter cannot express |
#[derive(Debug, ThisError)]
pub enum Error {
    /// An entity with the given canonical id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity with the given canonical id already exists.
    ///
    /// Inserts never overwrite: the first record is left unchanged and the
    /// second insert reports this variant.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A canonical id is empty
    /// - A field update carries a value outside its domain (e.g. rating > 10)
    /// - A bulk-load row fails shape validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend could not be reached or did not answer in time.
    ///
    /// Raised when:
    /// - The driver reports a connection or transport failure
    /// - The per-call timeout elapses (reported by the orchestrator)
    ///
    /// In `all`-targets mode this only marks the affected backend; sibling
    /// calls are never cancelled.
    #[error("backend '{backend}' unavailable: {cause}")]
    Unavailable {
        /// The backend that failed.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// A predicate or sort field was not recognized by an adapter.
    #[error("translation failed: {0}")]
    Translation(String),
}

impl Error {
    /// Returns the stable taxonomy code for this error.
    ///
    /// The code is what crosses the orchestrator boundary in per-backend
    /// failure entries; messages are free-form, codes are not.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Unavailable { .. } => ErrorCode::Unavailable,
            Self::Translation(_) => ErrorCode::Translation,
        }
    }

    /// Builds an `Unavailable` error for the named backend.
    pub fn unavailable(backend: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            cause: cause.to_string(),
        }
    }
}

/// Stable error codes shared across all adapters.
///
/// Serialized in snake case inside per-backend failure entries so a facade
/// can translate them into transport-level statuses without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Entity not found.
    NotFound,
    /// Duplicate canonical id on insert.
    AlreadyExists,
    /// Malformed input.
    InvalidInput,
    /// Backend unreachable or timed out.
    Unavailable,
    /// Unrecognized predicate or sort field.
    Translation,
}

impl ErrorCode {
    /// Returns the code as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidInput => "invalid_input",
            Self::Unavailable => "backend_unavailable",
            Self::Translation => "translation",
        }
    }
}

/// Result type alias for polystore operations.
pub type Result<T> = std::result::Result<T, Error>;
