//! Single-field title updates.

use serde_json::Value;

use super::TitleCategory;
use crate::{Error, Result};

/// A typed single-field update for a title.
///
/// The tagged representation replaces the source's stringly `(field, value)`
/// pairs: an unknown field or a value outside the field's domain is rejected
/// as [`Error::InvalidInput`] at the boundary, and adapters match on the
/// variant instead of re-validating strings. The canonical id is not a
/// variant on purpose: it is immutable.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the display name.
    Name(String),
    /// Replace the production category.
    Category(TitleCategory),
    /// Replace (or clear) the release year.
    ReleaseYear(Option<i32>),
    /// Replace the genre set.
    Genres(Vec<String>),
    /// Replace (or clear) the rating.
    Rating(Option<f64>),
    /// Replace (or clear) the vote count.
    Votes(Option<i64>),
    /// Replace (or clear) the runtime.
    RuntimeMinutes(Option<i32>),
    /// Replace (or clear) the synopsis.
    Synopsis(Option<String>),
}

impl FieldUpdate {
    /// Parses a `(field, value)` pair as received from a facade.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for unknown fields or values outside the
    /// field's domain.
    pub fn parse(field: &str, value: Value) -> Result<Self> {
        match field {
            "name" => match value {
                Value::String(s) if !s.trim().is_empty() => Ok(Self::Name(s)),
                _ => Err(Error::InvalidInput("name must be a non-empty string".into())),
            },
            "category" => match value {
                Value::String(s) => Ok(Self::Category(TitleCategory::parse(&s))),
                _ => Err(Error::InvalidInput("category must be a string".into())),
            },
            "release_year" => Ok(Self::ReleaseYear(parse_opt_int(value, "release_year")?)),
            "genres" => match value {
                Value::Array(items) => {
                    let genres = items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(s) => Ok(s.trim().to_string()),
                            _ => Err(Error::InvalidInput("genres must be strings".into())),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Self::Genres(genres.into_iter().filter(|g| !g.is_empty()).collect()))
                },
                _ => Err(Error::InvalidInput("genres must be an array".into())),
            },
            "rating" => match value {
                Value::Null => Ok(Self::Rating(None)),
                Value::Number(n) => {
                    let rating = n
                        .as_f64()
                        .ok_or_else(|| Error::InvalidInput("rating must be numeric".into()))?;
                    if (0.0..=10.0).contains(&rating) {
                        Ok(Self::Rating(Some(rating)))
                    } else {
                        Err(Error::InvalidInput(format!("rating {rating} outside 0-10")))
                    }
                },
                _ => Err(Error::InvalidInput("rating must be numeric or null".into())),
            },
            "votes" => match value {
                Value::Null => Ok(Self::Votes(None)),
                Value::Number(n) => match n.as_i64() {
                    Some(v) if v >= 0 => Ok(Self::Votes(Some(v))),
                    _ => Err(Error::InvalidInput("votes must be a non-negative integer".into())),
                },
                _ => Err(Error::InvalidInput("votes must be an integer or null".into())),
            },
            "runtime_minutes" => {
                let minutes = parse_opt_int(value, "runtime_minutes")?;
                if matches!(minutes, Some(m) if m < 0) {
                    return Err(Error::InvalidInput("runtime_minutes must be non-negative".into()));
                }
                Ok(Self::RuntimeMinutes(minutes))
            },
            "synopsis" => match value {
                Value::Null => Ok(Self::Synopsis(None)),
                Value::String(s) => Ok(Self::Synopsis(Some(s))),
                _ => Err(Error::InvalidInput("synopsis must be a string or null".into())),
            },
            other => Err(Error::InvalidInput(format!("unknown title field '{other}'"))),
        }
    }

    /// Returns the canonical field name this update targets.
    #[must_use]
    pub const fn field_name(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Category(_) => "category",
            Self::ReleaseYear(_) => "release_year",
            Self::Genres(_) => "genres",
            Self::Rating(_) => "rating",
            Self::Votes(_) => "votes",
            Self::RuntimeMinutes(_) => "runtime_minutes",
            Self::Synopsis(_) => "synopsis",
        }
    }

    /// Applies the update to a title in place.
    ///
    /// Adapters that rewrite whole records (and the in-memory backend) reuse
    /// this; engines with native single-field updates translate the variant
    /// instead.
    pub fn apply(&self, title: &mut super::Title) {
        match self {
            Self::Name(name) => title.name = name.clone(),
            Self::Category(category) => title.category = category.clone(),
            Self::ReleaseYear(year) => title.release_year = *year,
            Self::Genres(genres) => title.genres = genres.clone(),
            Self::Rating(rating) => title.rating = *rating,
            Self::Votes(votes) => title.votes = *votes,
            Self::RuntimeMinutes(minutes) => title.runtime_minutes = *minutes,
            Self::Synopsis(synopsis) => title.synopsis = synopsis.clone(),
        }
    }
}

fn parse_opt_int(value: Value, field: &str) -> Result<Option<i32>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| Error::InvalidInput(format!("{field} must be a 32-bit integer"))),
        _ => Err(Error::InvalidInput(format!("{field} must be an integer or null"))),
    }
}
