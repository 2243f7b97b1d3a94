//! Entity types and canonical identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Canonical identifier for a title.
///
/// Assigned by the caller, never generated by a backend, and immutable for
/// the life of the record. All four engines key their native representation
/// off this string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(String);

impl TitleId {
    /// Creates a new title id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TitleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TitleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical identifier for a person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    /// Creates a new person id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PersonId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Production category of a title.
///
/// Stored in every engine as the normalized lowercase token from
/// [`TitleCategory::as_str`], so category equality is exact everywhere.
/// `Game` is special-cased: runtime filters never apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TitleCategory {
    /// Feature film.
    Movie,
    /// Episodic series.
    Series,
    /// Short film.
    Short,
    /// Documentary.
    Documentary,
    /// Video game (no meaningful runtime).
    Game,
    /// Any category outside the known set, kept verbatim.
    Other(String),
}

impl TitleCategory {
    /// Parses a category token, case-insensitively.
    ///
    /// Unknown tokens are preserved in [`TitleCategory::Other`] rather than
    /// rejected; bulk sources carry a long tail of production types.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "movie" => Self::Movie,
            "series" => Self::Series,
            "short" => Self::Short,
            "documentary" => Self::Documentary,
            "game" => Self::Game,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the normalized storage token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Short => "short",
            Self::Documentary => "documentary",
            Self::Game => "game",
            Self::Other(s) => s,
        }
    }

    /// Whether this is the game category.
    #[must_use]
    pub const fn is_game(&self) -> bool {
        matches!(self, Self::Game)
    }
}

impl fmt::Display for TitleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for TitleCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TitleCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// A catalog title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    /// Canonical identifier.
    #[serde(rename = "_id")]
    pub id: TitleId,
    /// Display name.
    pub name: String,
    /// Production category.
    pub category: TitleCategory,
    /// Release year, when known.
    #[serde(default)]
    pub release_year: Option<i32>,
    /// Genre labels; ordered for display, semantically a set.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Average rating on a 0–10 scale.
    #[serde(default)]
    pub rating: Option<f64>,
    /// Number of votes behind the rating.
    #[serde(default)]
    pub votes: Option<i64>,
    /// Runtime in minutes; not meaningful for games.
    #[serde(default)]
    pub runtime_minutes: Option<i32>,
    /// Plot synopsis.
    #[serde(default)]
    pub synopsis: Option<String>,
}

impl Title {
    /// Validates the canonical shape.
    ///
    /// Checks the invariants every backend relies on: non-empty id and name,
    /// rating within 0–10, non-negative votes and runtime.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("title id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "title '{}' has an empty name",
                self.id
            )));
        }
        if let Some(rating) = self.rating {
            if !(0.0..=10.0).contains(&rating) {
                return Err(Error::InvalidInput(format!(
                    "title '{}' rating {rating} outside 0-10",
                    self.id
                )));
            }
        }
        if matches!(self.votes, Some(v) if v < 0) {
            return Err(Error::InvalidInput(format!(
                "title '{}' has negative votes",
                self.id
            )));
        }
        if matches!(self.runtime_minutes, Some(m) if m < 0) {
            return Err(Error::InvalidInput(format!(
                "title '{}' has negative runtime",
                self.id
            )));
        }
        Ok(())
    }
}

/// A person appearing in titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Canonical identifier.
    #[serde(rename = "_id")]
    pub id: PersonId,
    /// Full name.
    pub name: String,
    /// Birth year, when known.
    #[serde(default)]
    pub birth_year: Option<i32>,
}

impl Person {
    /// Validates the canonical shape.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("person id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "person '{}' has an empty name",
                self.id
            )));
        }
        Ok(())
    }
}

/// An appearance credit linking a person to a title with a role label.
///
/// A given (person, title) pair maps to at most one stored role per backend;
/// re-inserting the pair overwrites the role instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    /// The appearing person.
    pub person_id: PersonId,
    /// The title appeared in.
    pub title_id: TitleId,
    /// Role label (character name).
    pub role: String,
}

impl Credit {
    /// Validates the canonical shape.
    pub fn validate(&self) -> Result<()> {
        if self.person_id.as_str().trim().is_empty() || self.title_id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput(
                "credit requires both a person id and a title id".into(),
            ));
        }
        Ok(())
    }
}

/// A person hydrated for a title's cast listing, with the credited role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastMember {
    /// The person record.
    #[serde(flatten)]
    pub person: Person,
    /// Credited role, when one was stored.
    pub role: Option<String>,
}

/// One row of the titles-per-year aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    /// Release year.
    pub year: i32,
    /// Number of titles released that year.
    pub count: u64,
}

/// One row of the average-rating-per-genre aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreAverage {
    /// Genre label.
    pub genre: String,
    /// Mean rating across rated titles in the genre, rounded to two decimals.
    pub average: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_title() -> Title {
        Title {
            id: TitleId::new("tt0001"),
            name: "Example".to_string(),
            category: TitleCategory::Movie,
            release_year: Some(2001),
            genres: vec!["Drama".to_string()],
            rating: Some(7.4),
            votes: Some(1200),
            runtime_minutes: Some(101),
            synopsis: None,
        }
    }

    #[test]
    fn test_category_parse_round_trip() {
        for token in ["movie", "series", "short", "documentary", "game"] {
            assert_eq!(TitleCategory::parse(token).as_str(), token);
        }
        assert_eq!(TitleCategory::parse("Movie"), TitleCategory::Movie);
        assert_eq!(
            TitleCategory::parse("tvMiniSeries"),
            TitleCategory::Other("tvminiseries".to_string())
        );
    }

    #[test]
    fn test_category_game_exemption_flag() {
        assert!(TitleCategory::Game.is_game());
        assert!(!TitleCategory::Movie.is_game());
    }

    #[test]
    fn test_title_validation() {
        assert!(sample_title().validate().is_ok());

        let mut bad = sample_title();
        bad.id = TitleId::new("  ");
        assert!(matches!(bad.validate(), Err(Error::InvalidInput(_))));

        let mut bad = sample_title();
        bad.rating = Some(11.0);
        assert!(matches!(bad.validate(), Err(Error::InvalidInput(_))));

        let mut bad = sample_title();
        bad.votes = Some(-1);
        assert!(matches!(bad.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_title_serde_uses_canonical_id_key() {
        let json = serde_json::to_value(sample_title()).unwrap();
        assert_eq!(json["_id"], "tt0001");
        assert_eq!(json["category"], "movie");

        let back: Title = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample_title());
    }

    #[test]
    fn test_credit_validation() {
        let credit = Credit {
            person_id: PersonId::new("nm1"),
            title_id: TitleId::new(""),
            role: "Lead".to_string(),
        };
        assert!(credit.validate().is_err());
    }
}
