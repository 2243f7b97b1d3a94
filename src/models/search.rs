//! Search filter and ordering types.

use serde::{Deserialize, Serialize};

use super::TitleCategory;
use crate::{Error, Result};

/// Canonical filter vocabulary for title search.
///
/// Each adapter classifies every field as native-pushable or post-filter-only
/// for its engine; the filter itself is engine-agnostic. An empty filter
/// matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TitleFilter {
    /// Case-insensitive substring match on the title name.
    pub name_contains: Option<String>,
    /// Exact match on the normalized category token.
    pub category: Option<TitleCategory>,
    /// Inclusive lower bound on the release year.
    pub year_min: Option<i32>,
    /// The title's genre set must contain every listed genre.
    pub genres_all: Vec<String>,
    /// Inclusive lower bound on the rating.
    ///
    /// Skipped for future-release titles without an evaluation; see
    /// [`crate::SearchPolicy`].
    pub rating_min: Option<f64>,
    /// Inclusive lower bound on runtime minutes.
    ///
    /// Skipped for game titles and for unevaluated future releases.
    pub runtime_min: Option<i32>,
}

impl TitleFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name substring filter.
    #[must_use]
    pub fn with_name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    /// Sets the category filter.
    #[must_use]
    pub fn with_category(mut self, category: TitleCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the minimum release year.
    #[must_use]
    pub const fn with_year_min(mut self, year: i32) -> Self {
        self.year_min = Some(year);
        self
    }

    /// Adds a required genre.
    #[must_use]
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genres_all.push(genre.into());
        self
    }

    /// Sets the minimum rating.
    #[must_use]
    pub const fn with_rating_min(mut self, rating: f64) -> Self {
        self.rating_min = Some(rating);
        self
    }

    /// Sets the minimum runtime.
    #[must_use]
    pub const fn with_runtime_min(mut self, minutes: i32) -> Self {
        self.runtime_min = Some(minutes);
        self
    }

    /// Returns true if the filter is empty (matches all).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_contains.is_none()
            && self.category.is_none()
            && self.year_min.is_none()
            && self.genres_all.is_empty()
            && self.rating_min.is_none()
            && self.runtime_min.is_none()
    }

    /// Whether the filter carries a rating or runtime bound.
    ///
    /// These are the two fields the future-release exception can exempt a
    /// title from.
    #[must_use]
    pub const fn has_evaluation_bounds(&self) -> bool {
        self.rating_min.is_some() || self.runtime_min.is_some()
    }
}

/// Fields a search result can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Title name, case-insensitive.
    Name,
    /// Release year.
    ReleaseYear,
    /// Rating.
    Rating,
    /// Vote count.
    Votes,
    /// Runtime minutes.
    RuntimeMinutes,
}

impl SortField {
    /// Parses a sort field token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Translation`] for unrecognized tokens, matching the
    /// taxonomy every adapter reports for unknown sort fields.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(Self::Name),
            "release_year" => Ok(Self::ReleaseYear),
            "rating" => Ok(Self::Rating),
            "votes" => Ok(Self::Votes),
            "runtime_minutes" => Ok(Self::RuntimeMinutes),
            other => Err(Error::Translation(format!("unknown sort field '{other}'"))),
        }
    }

    /// Returns the canonical field token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ReleaseYear => "release_year",
            Self::Rating => "rating",
            Self::Votes => "votes",
            Self::RuntimeMinutes => "runtime_minutes",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Requested ordering for a search or traversal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Field to order by.
    pub field: SortField,
    /// Direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Creates a sort specification.
    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Rating descending, the default search ordering.
    #[must_use]
    pub const fn rating_desc() -> Self {
        Self::new(SortField::Rating, SortDirection::Desc)
    }

    /// Release year descending, the default traversal ordering.
    #[must_use]
    pub const fn year_desc() -> Self {
        Self::new(SortField::ReleaseYear, SortDirection::Desc)
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::rating_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        assert!(TitleFilter::new().is_empty());
        assert!(!TitleFilter::new().with_genre("Action").is_empty());
    }

    #[test]
    fn test_evaluation_bounds() {
        assert!(!TitleFilter::new().with_year_min(2000).has_evaluation_bounds());
        assert!(TitleFilter::new().with_rating_min(8.0).has_evaluation_bounds());
        assert!(TitleFilter::new().with_runtime_min(90).has_evaluation_bounds());
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!(SortField::parse("rating").ok(), Some(SortField::Rating));
        assert!(matches!(
            SortField::parse("nota"),
            Err(crate::Error::Translation(_))
        ));
    }
}
