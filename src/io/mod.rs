//! Bulk-load record sources.
//!
//! The loader consumes three tab-separated files (titles, people, credits).
//! `\N` and empty cells mean null, matching the export format of the demo
//! datasets. Parsing and shape validation happen here, row by row; a bad
//! row becomes a [`RowFailure`] and never aborts the batch.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{Credit, Person, PersonId, Title, TitleCategory, TitleId};
use crate::{Error, Result};

/// A recorded row-level load failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    /// Source file stem (`titles`, `people`, `credits`).
    pub source: String,
    /// 1-based line number, header included.
    pub line: u64,
    /// Offending canonical id, when one was readable.
    pub id: Option<String>,
    /// What went wrong.
    pub reason: String,
}

/// Raw title row as it appears in the TSV.
#[derive(Debug, Deserialize)]
struct TitleRecord {
    title_id: String,
    name: String,
    category: String,
    release_year: String,
    genres: String,
    rating: String,
    votes: String,
    runtime_minutes: String,
    synopsis: String,
}

/// Raw person row.
#[derive(Debug, Deserialize)]
struct PersonRecord {
    person_id: String,
    name: String,
    birth_year: String,
}

/// Raw credit row.
#[derive(Debug, Deserialize)]
struct CreditRecord {
    person_id: String,
    title_id: String,
    role: String,
}

/// A null-capable cell: `\N` and empty both mean absent.
fn cell(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == r"\N" {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_num<T: std::str::FromStr>(raw: &str, field: &str) -> std::result::Result<Option<T>, String> {
    match cell(raw) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| format!("{field} '{value}' is not numeric")),
    }
}

/// Splits a genre cell, tolerating bracketed list syntax from older exports.
fn split_genres(raw: &str) -> Vec<String> {
    let Some(value) = cell(raw) else {
        return Vec::new();
    };
    value
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '\'' | '"'))
        .collect::<String>()
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_title_record(record: TitleRecord) -> std::result::Result<Title, String> {
    let id = cell(&record.title_id).ok_or("title_id is missing")?;
    let title = Title {
        id: TitleId::new(id),
        name: cell(&record.name).unwrap_or_default().to_string(),
        category: TitleCategory::parse(cell(&record.category).unwrap_or("")),
        release_year: parse_num(&record.release_year, "release_year")?,
        genres: split_genres(&record.genres),
        rating: parse_num(&record.rating, "rating")?,
        votes: parse_num(&record.votes, "votes")?,
        runtime_minutes: parse_num(&record.runtime_minutes, "runtime_minutes")?,
        synopsis: cell(&record.synopsis).map(ToString::to_string),
    };
    title.validate().map_err(|e| e.to_string())?;
    Ok(title)
}

fn parse_person_record(record: PersonRecord) -> std::result::Result<Person, String> {
    let id = cell(&record.person_id).ok_or("person_id is missing")?;
    let person = Person {
        id: PersonId::new(id),
        name: cell(&record.name).unwrap_or_default().to_string(),
        birth_year: parse_num(&record.birth_year, "birth_year")?,
    };
    person.validate().map_err(|e| e.to_string())?;
    Ok(person)
}

fn parse_credit_record(record: CreditRecord) -> std::result::Result<Credit, String> {
    let person_id = cell(&record.person_id).ok_or("person_id is missing")?;
    let title_id = cell(&record.title_id).ok_or("title_id is missing")?;
    Ok(Credit {
        person_id: PersonId::new(person_id),
        title_id: TitleId::new(title_id),
        role: cell(&record.role).unwrap_or_default().to_string(),
    })
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(false)
        .from_path(path)
        .map_err(|e| Error::InvalidInput(format!("cannot open {}: {e}", path.display())))
}

/// Generic row walk: deserialize, parse, collect survivors and failures.
fn read_rows<Raw, Entity, P>(
    path: &Path,
    source: &str,
    parse: P,
    failures: &mut Vec<RowFailure>,
) -> Result<Vec<Entity>>
where
    Raw: for<'de> Deserialize<'de>,
    P: Fn(Raw) -> std::result::Result<Entity, String>,
{
    let mut reader = tsv_reader(path)?;
    let mut entities = Vec::new();
    for (index, row) in reader.deserialize::<Raw>().enumerate() {
        // Header is line 1; the first record is line 2.
        let line = index as u64 + 2;
        match row {
            Ok(record) => match parse(record) {
                Ok(entity) => entities.push(entity),
                Err(reason) => failures.push(RowFailure {
                    source: source.to_string(),
                    line,
                    id: None,
                    reason,
                }),
            },
            Err(e) => failures.push(RowFailure {
                source: source.to_string(),
                line,
                id: None,
                reason: format!("malformed row: {e}"),
            }),
        }
    }
    Ok(entities)
}

/// Reads and validates a titles TSV.
///
/// Returns the valid titles; failures are appended to `failures`.
pub fn read_titles(path: &Path, failures: &mut Vec<RowFailure>) -> Result<Vec<Title>> {
    let mut titles = read_rows(path, "titles", parse_title_record, failures)?;
    dedup_by_id(&mut titles, "titles", |t: &Title| t.id.to_string(), failures);
    Ok(titles)
}

/// Reads and validates a people TSV.
pub fn read_people(path: &Path, failures: &mut Vec<RowFailure>) -> Result<Vec<Person>> {
    let mut people = read_rows(path, "people", parse_person_record, failures)?;
    dedup_by_id(&mut people, "people", |p: &Person| p.id.to_string(), failures);
    Ok(people)
}

/// Reads and validates a credits TSV.
///
/// A repeated (person, title) pair keeps the last role, mirroring the
/// per-backend overwrite semantics.
pub fn read_credits(path: &Path, failures: &mut Vec<RowFailure>) -> Result<Vec<Credit>> {
    let credits = read_rows(path, "credits", parse_credit_record, failures)?;
    let mut by_pair: std::collections::BTreeMap<(PersonId, TitleId), Credit> =
        std::collections::BTreeMap::new();
    for credit in credits {
        by_pair.insert((credit.person_id.clone(), credit.title_id.clone()), credit);
    }
    Ok(by_pair.into_values().collect())
}

/// First occurrence wins; later duplicates are recorded as failures.
fn dedup_by_id<T, K>(entities: &mut Vec<T>, source: &str, key: K, failures: &mut Vec<RowFailure>)
where
    K: Fn(&T) -> String,
{
    let mut seen = std::collections::BTreeSet::new();
    entities.retain(|entity| {
        let id = key(entity);
        if seen.insert(id.clone()) {
            true
        } else {
            failures.push(RowFailure {
                source: source.to_string(),
                line: 0,
                id: Some(id),
                reason: "duplicate id in batch".to_string(),
            });
            false
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tsv(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_titles_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tsv(
            &dir,
            "titles.tsv",
            "title_id\tname\tcategory\trelease_year\tgenres\trating\tvotes\truntime_minutes\tsynopsis\n\
             tt1\tFirst\tmovie\t1999\tAction, Drama\t7.5\t1200\t120\tA film.\n\
             tt2\tSecond\tgame\t\\N\tAdventure\t\\N\t\\N\t\\N\t\\N\n",
        );
        let mut failures = Vec::new();
        let titles = read_titles(&path, &mut failures).unwrap();
        assert!(failures.is_empty());
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].genres, vec!["Action", "Drama"]);
        assert_eq!(titles[1].release_year, None);
        assert!(titles[1].category.is_game());
    }

    #[test]
    fn test_bad_row_is_recorded_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tsv(
            &dir,
            "titles.tsv",
            "title_id\tname\tcategory\trelease_year\tgenres\trating\tvotes\truntime_minutes\tsynopsis\n\
             tt1\tGood\tmovie\t2001\tDrama\t6.0\t100\t90\tok\n\
             \\N\tNo Id\tmovie\t2002\tDrama\t6.0\t100\t90\tbad\n\
             tt3\tAlso Good\tmovie\t2003\tDrama\t6.0\t100\t90\tok\n",
        );
        let mut failures = Vec::new();
        let titles = read_titles(&path, &mut failures).unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].line, 3);
        assert!(failures[0].reason.contains("title_id"));
    }

    #[test]
    fn test_duplicate_title_id_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tsv(
            &dir,
            "titles.tsv",
            "title_id\tname\tcategory\trelease_year\tgenres\trating\tvotes\truntime_minutes\tsynopsis\n\
             tt1\tOriginal\tmovie\t2001\tDrama\t6.0\t100\t90\tok\n\
             tt1\tDuplicate\tmovie\t2002\tDrama\t6.0\t100\t90\tok\n",
        );
        let mut failures = Vec::new();
        let titles = read_titles(&path, &mut failures).unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].name, "Original");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id.as_deref(), Some("tt1"));
    }

    #[test]
    fn test_credit_pairs_keep_last_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tsv(
            &dir,
            "credits.tsv",
            "person_id\ttitle_id\trole\n\
             nm1\ttt1\tFirst Role\n\
             nm1\ttt1\tSecond Role\n",
        );
        let mut failures = Vec::new();
        let credits = read_credits(&path, &mut failures).unwrap();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].role, "Second Role");
    }

    #[test]
    fn test_genre_cell_bracket_cleanup() {
        assert_eq!(
            split_genres("['Action', 'Sci-Fi']"),
            vec!["Action", "Sci-Fi"]
        );
        assert_eq!(split_genres(r"\N"), Vec::<String>::new());
    }
}
