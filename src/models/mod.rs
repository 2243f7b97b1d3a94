//! Canonical entity and query types.
//!
//! Every backend stores and returns these shapes; engine-specific layouts
//! (documents, rows, nodes, hashes) never leak past the adapter boundary.

mod entity;
mod search;
mod update;

pub use entity::{
    CastMember, Credit, GenreAverage, Person, PersonId, Title, TitleCategory, TitleId, YearCount,
};
pub use search::{Sort, SortDirection, SortField, TitleFilter};
pub use update::FieldUpdate;
