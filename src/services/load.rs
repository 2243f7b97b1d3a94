//! Bulk loading service.
//!
//! Reads the three TSV sources once, validates rows with non-aborting error
//! collection, then streams the surviving batch into each targeted backend:
//! reset first, then titles, people, credits through the engine's native
//! batch primitive.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::io::{self, RowFailure};
use crate::models::{Credit, Person, Title};
use crate::services::{Catalog, FanoutResult, Target};
use crate::Result;

/// Per-backend outcome of a bulk load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Titles inserted.
    pub titles: usize,
    /// People inserted.
    pub people: usize,
    /// Credits inserted.
    pub credits: usize,
    /// Row-level failures collected during validation.
    pub failures: Vec<RowFailure>,
}

/// A validated batch ready to stream into backends.
///
/// Built once from the sources; the same batch fans out to every target, so
/// validation cost is paid once, not per backend.
pub struct BulkLoader {
    batch: Arc<Batch>,
}

struct Batch {
    titles: Vec<Title>,
    people: Vec<Person>,
    credits: Vec<Credit>,
    failures: Vec<RowFailure>,
}

impl BulkLoader {
    /// Reads and validates the three sources.
    ///
    /// Row failures are collected, never fatal; only an unreadable file
    /// aborts.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidInput`] when a source file cannot be opened.
    pub fn from_paths(titles: &Path, people: &Path, credits: &Path) -> Result<Self> {
        let mut failures = Vec::new();
        let titles = io::read_titles(titles, &mut failures)?;
        let people = io::read_people(people, &mut failures)?;
        let credits = io::read_credits(credits, &mut failures)?;
        tracing::info!(
            titles = titles.len(),
            people = people.len(),
            credits = credits.len(),
            failures = failures.len(),
            "bulk batch validated"
        );
        Ok(Self {
            batch: Arc::new(Batch {
                titles,
                people,
                credits,
                failures,
            }),
        })
    }

    /// Builds a loader directly from validated entities (used by tests and
    /// programmatic callers).
    #[must_use]
    pub fn from_entities(
        titles: Vec<Title>,
        people: Vec<Person>,
        credits: Vec<Credit>,
        failures: Vec<RowFailure>,
    ) -> Self {
        Self {
            batch: Arc::new(Batch {
                titles,
                people,
                credits,
                failures,
            }),
        }
    }

    /// Row failures recorded during validation.
    #[must_use]
    pub fn failures(&self) -> &[RowFailure] {
        &self.batch.failures
    }

    /// Streams the batch into the targeted backend(s): reset, then titles,
    /// people, credits. Per-backend failures surface through the usual
    /// fan-out envelope.
    pub async fn run(&self, catalog: &Catalog, target: Target) -> Result<FanoutResult<LoadReport>> {
        let batch = Arc::clone(&self.batch);
        catalog
            .dispatch_with(target, move |backend| {
                let batch = Arc::clone(&batch);
                Box::pin(async move {
                    backend.reset().await?;
                    let titles = backend.load_titles(&batch.titles).await?;
                    let people = backend.load_people(&batch.people).await?;
                    let credits = backend.load_credits(&batch.credits).await?;
                    Ok(LoadReport {
                        titles,
                        people,
                        credits,
                        failures: batch.failures.clone(),
                    })
                })
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{PersonId, Sort, TitleCategory, TitleId};
    use crate::storage::memory::MemoryBackend;
    use crate::storage::CatalogBackend;
    use crate::storage::BackendKind;
    use std::io::Write;
    use std::time::Duration;

    fn write_tsv(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn fixture(dir: &tempfile::TempDir) -> BulkLoader {
        let titles = write_tsv(
            dir,
            "titles.tsv",
            "title_id\tname\tcategory\trelease_year\tgenres\trating\tvotes\truntime_minutes\tsynopsis\n\
             tt1\tFirst\tmovie\t1999\tAction\t7.5\t1200\t120\tA film.\n\
             \\N\tBroken\tmovie\t2000\tDrama\t5.0\t10\t90\tno id\n\
             tt2\tSecond\tseries\t2021\tDrama\t8.1\t900\t45\tA show.\n",
        );
        let people = write_tsv(
            dir,
            "people.tsv",
            "person_id\tname\tbirth_year\nnm1\tAlice Example\t1970\n",
        );
        let credits = write_tsv(
            dir,
            "credits.tsv",
            "person_id\ttitle_id\trole\nnm1\ttt1\tLead\nnm1\ttt2\tGuest\n",
        );
        BulkLoader::from_paths(&titles, &people, &credits).unwrap()
    }

    #[tokio::test]
    async fn test_bad_row_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let loader = fixture(&dir);
        assert_eq!(loader.failures().len(), 1);

        let catalog = Catalog::new(Duration::from_secs(5))
            .register(BackendKind::Mongo, Arc::new(MemoryBackend::default()));
        let result = loader
            .run(&catalog, Target::One(BackendKind::Mongo))
            .await
            .unwrap();
        let report = result.into_single().unwrap();
        assert_eq!(report.titles, 2);
        assert_eq!(report.people, 1);
        assert_eq!(report.credits, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].line, 3);
    }

    #[tokio::test]
    async fn test_loaded_data_is_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let loader = fixture(&dir);
        let backend = Arc::new(MemoryBackend::default());
        let catalog = Catalog::new(Duration::from_secs(5))
            .register(BackendKind::Mongo, Arc::clone(&backend) as Arc<dyn crate::storage::CatalogBackend>);

        loader
            .run(&catalog, Target::One(BackendKind::Mongo))
            .await
            .unwrap();

        let title = backend.get_title(&TitleId::new("tt1")).await.unwrap();
        assert_eq!(title.name, "First");
        assert_eq!(title.category, TitleCategory::Movie);

        let titles = backend
            .titles_by_person("nm1", Sort::year_desc(), 10)
            .await
            .unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].id, TitleId::new("tt2"));

        backend.get_person(&PersonId::new("nm1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let loader = fixture(&dir);
        let backend = Arc::new(MemoryBackend::default());
        let catalog = Catalog::new(Duration::from_secs(5))
            .register(BackendKind::Mongo, Arc::clone(&backend) as Arc<dyn crate::storage::CatalogBackend>);

        loader.run(&catalog, Target::One(BackendKind::Mongo)).await.unwrap();
        let second = loader
            .run(&catalog, Target::One(BackendKind::Mongo))
            .await
            .unwrap()
            .into_single()
            .unwrap();
        assert_eq!(second.titles, 2);

        let counts = backend.count_by_year().await.unwrap();
        let total: u64 = counts.iter().map(|c| c.count).sum();
        assert_eq!(total, 2);
    }
}
