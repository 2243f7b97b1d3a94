//! Shared predicate evaluation, ordering, and aggregation arithmetic.
//!
//! Engines differ wildly in query power; whatever an adapter cannot push
//! down natively it evaluates here, so the observable filter semantics are
//! identical across all four backends. The Mongo and Neo4j adapters encode
//! the same rules into their native queries and treat this module as the
//! reference semantics.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{GenreAverage, Sort, SortDirection, SortField, Title, TitleFilter, YearCount};

/// Policy constants governing search semantics.
///
/// The future-release rule is business policy, not a storage artifact: a
/// title released at or after the cutoff with no rating and no votes is
/// treated as "not yet evaluated" and exempted from `rating_min` and
/// `runtime_min`. The cutoff is configurable because nothing about the
/// specific year is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPolicy {
    /// First release year treated as a future release.
    pub future_cutoff_year: i32,
}

impl SearchPolicy {
    /// Creates a policy with the given cutoff year.
    #[must_use]
    pub const fn new(future_cutoff_year: i32) -> Self {
        Self { future_cutoff_year }
    }

    /// Whether a title counts as a future release without an evaluation.
    ///
    /// Zero and absent are equivalent for both rating and votes; a future
    /// title with either a non-zero rating or non-zero votes is evaluated
    /// normally.
    #[must_use]
    pub fn is_unevaluated_future(&self, title: &Title) -> bool {
        let future = matches!(title.release_year, Some(y) if y >= self.future_cutoff_year);
        let unrated = title.rating.is_none_or(|r| r == 0.0);
        let unvoted = title.votes.is_none_or(|v| v == 0);
        future && unrated && unvoted
    }
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self::new(2025)
    }
}

/// Evaluates the canonical filter against one title.
///
/// Order matters: the title is classified as unevaluated-future first, then
/// the remaining predicates apply, skipping only `rating_min` and
/// `runtime_min` for that classification. `runtime_min` additionally never
/// applies to game titles. A missing value fails its bound (a title without
/// a year never satisfies `year_min`) except where the exemption applies.
#[must_use]
pub fn title_matches(title: &Title, filter: &TitleFilter, policy: SearchPolicy) -> bool {
    if let Some(fragment) = &filter.name_contains {
        if !title.name.to_lowercase().contains(&fragment.to_lowercase()) {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if title.category != *category {
            return false;
        }
    }
    if let Some(year_min) = filter.year_min {
        match title.release_year {
            Some(year) if year >= year_min => {},
            _ => return false,
        }
    }
    if !filter.genres_all.is_empty() {
        let has_all = filter
            .genres_all
            .iter()
            .all(|wanted| title.genres.iter().any(|g| g == wanted));
        if !has_all {
            return false;
        }
    }

    let exempt = policy.is_unevaluated_future(title);
    if !exempt {
        if let Some(rating_min) = filter.rating_min {
            match title.rating {
                Some(rating) if rating >= rating_min => {},
                _ => return false,
            }
        }
        if let Some(runtime_min) = filter.runtime_min {
            if !title.category.is_game() {
                match title.runtime_minutes {
                    Some(minutes) if minutes >= runtime_min => {},
                    _ => return false,
                }
            }
        }
    }

    true
}

/// Compares two titles under a sort specification.
///
/// Numeric fields compare as numbers, names case-insensitively. Missing
/// values order first under either direction (smallest ascending, largest
/// descending); ties break on canonical id ascending so every adapter
/// returns the same order for the same data.
#[must_use]
pub fn compare_titles(a: &Title, b: &Title, sort: Sort) -> Ordering {
    let primary = match sort.field {
        SortField::Name => directed(
            Some(a.name.to_lowercase()),
            Some(b.name.to_lowercase()),
            sort.direction,
        ),
        SortField::ReleaseYear => directed(a.release_year, b.release_year, sort.direction),
        SortField::Rating => directed(
            a.rating.map(TotalF64),
            b.rating.map(TotalF64),
            sort.direction,
        ),
        SortField::Votes => directed(a.votes, b.votes, sort.direction),
        SortField::RuntimeMinutes => {
            directed(a.runtime_minutes, b.runtime_minutes, sort.direction)
        },
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// Sorts a candidate set in place and truncates it to the limit.
pub fn sort_and_truncate(titles: &mut Vec<Title>, sort: Sort, limit: usize) {
    titles.sort_by(|a, b| compare_titles(a, b, sort));
    titles.truncate(limit);
}

fn directed<K: Ord>(a: Option<K>, b: Option<K>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        // Absent values lead regardless of direction.
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.cmp(&y),
            SortDirection::Desc => y.cmp(&x),
        },
    }
}

/// Total ordering for ratings; the 0-10 domain has no NaN in valid data, and
/// any NaN that slips through sorts low instead of panicking.
#[derive(PartialEq)]
struct TotalF64(f64);

impl Eq for TotalF64 {}

impl PartialOrd for TotalF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or_else(|| {
            match (self.0.is_nan(), other.0.is_nan()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            }
        })
    }
}

/// Counts titles per release year, ascending by year.
///
/// Shared by the adapters whose engine has no aggregation primitive; the
/// document and graph engines produce the same shape natively.
#[must_use]
pub fn count_by_year<'a>(titles: impl IntoIterator<Item = &'a Title>) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, u64> = BTreeMap::new();
    for title in titles {
        if let Some(year) = title.release_year {
            *counts.entry(year).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}

/// Averages ratings per genre, descending by average with a genre tiebreak.
///
/// Unrated titles are excluded; averages are rounded to two decimals.
#[must_use]
pub fn average_rating_by_genre<'a>(
    titles: impl IntoIterator<Item = &'a Title>,
) -> Vec<GenreAverage> {
    let mut sums: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for title in titles {
        let Some(rating) = title.rating else { continue };
        for genre in &title.genres {
            let entry = sums.entry(genre.clone()).or_insert((0.0, 0));
            entry.0 += rating;
            entry.1 += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let mut averages: Vec<GenreAverage> = sums
        .into_iter()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(genre, (sum, count))| GenreAverage {
            genre,
            average: round2(sum / count as f64),
        })
        .collect();
    averages.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.genre.cmp(&b.genre))
    });
    averages
}

/// Rounds to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
