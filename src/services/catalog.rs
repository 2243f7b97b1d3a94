//! Fan-out orchestrator.
//!
//! One logical operation, one target selector: a single backend or all of
//! them. Single-target calls return the payload or the taxonomy error
//! directly. `all` runs every registered adapter concurrently, waits for
//! every one (no early cancellation), and reports per-backend outcomes in a
//! map; one backend failing never suppresses the others.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::config::PolystoreConfig;
use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, Title, TitleFilter,
    TitleId, YearCount,
};
use crate::storage::cassandra::CassandraBackend;
use crate::storage::mongo::MongoBackend;
use crate::storage::neo4j::Neo4jBackend;
use crate::storage::redis::RedisBackend;
use crate::storage::{BackendKind, CatalogBackend};
use crate::{Error, ErrorCode, Result};

/// Target selector for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A single backend.
    One(BackendKind),
    /// Every registered backend, concurrently.
    All,
}

impl Target {
    /// Parses a selector token (`mongo`, `cassandra`, `neo4j`, `redis`,
    /// `all`).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for anything else.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            BackendKind::parse(s).map(Self::One)
        }
    }
}

/// Per-backend entry of an `all`-target result map.
///
/// Serializes as `{"data": ...}` or `{"error": ..., "kind": ...}`, the shape
/// the facade passes through verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BackendOutcome<T> {
    /// The backend completed the operation.
    Success {
        /// Operation payload.
        data: T,
    },
    /// The backend failed; siblings are unaffected.
    Failure {
        /// Human-readable message.
        error: String,
        /// Stable taxonomy code.
        kind: ErrorCode,
    },
}

impl<T> BackendOutcome<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(e) => Self::Failure {
                kind: e.code(),
                error: e.to_string(),
            },
        }
    }

    /// The payload, when the backend succeeded.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    /// The taxonomy code, when the backend failed.
    pub const fn error_kind(&self) -> Option<ErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Result envelope of one orchestrated operation.
///
/// Never a mixture: a single-backend payload or the per-backend map.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FanoutResult<T> {
    /// Payload of a single-target call.
    Single(T),
    /// Per-backend outcomes of an `all`-target call.
    All(BTreeMap<BackendKind, BackendOutcome<T>>),
}

impl<T> FanoutResult<T> {
    /// The payload of a single-target call.
    pub fn into_single(self) -> Option<T> {
        match self {
            Self::Single(data) => Some(data),
            Self::All(_) => None,
        }
    }

    /// The per-backend map of an `all`-target call.
    pub const fn per_backend(&self) -> Option<&BTreeMap<BackendKind, BackendOutcome<T>>> {
        match self {
            Self::Single(_) => None,
            Self::All(map) => Some(map),
        }
    }
}

type OpFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// The catalog orchestrator.
///
/// Holds the fixed lookup table from selector to adapter. Adapters own their
/// connections; the orchestrator owns nothing but the table and the
/// per-call timeout.
pub struct Catalog {
    backends: BTreeMap<BackendKind, Arc<dyn CatalogBackend>>,
    op_timeout: Duration,
}

impl Catalog {
    /// Creates an empty orchestrator; register backends with
    /// [`Catalog::register`]. Production setups hold all four, tests
    /// register whatever they need.
    #[must_use]
    pub const fn new(op_timeout: Duration) -> Self {
        Self {
            backends: BTreeMap::new(),
            op_timeout,
        }
    }

    /// Registers an adapter under a backend slot.
    #[must_use]
    pub fn register(mut self, kind: BackendKind, backend: Arc<dyn CatalogBackend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    /// Connects all four engine adapters and builds the full registry.
    ///
    /// Connections are established concurrently; any one failing fails the
    /// whole startup (a missing engine at boot is a deployment problem, not
    /// a partial-failure case).
    ///
    /// # Errors
    ///
    /// Propagates the first [`Error::Unavailable`] from an adapter.
    pub async fn connect(config: &PolystoreConfig) -> Result<Self> {
        let policy = config.search_policy();
        let (mongo, cassandra, neo4j, redis) = tokio::try_join!(
            MongoBackend::connect(&config.mongo, policy),
            CassandraBackend::connect(&config.cassandra, policy, config.scan_fetch_cap),
            Neo4jBackend::connect(&config.neo4j, policy),
            RedisBackend::connect(&config.redis, policy),
        )?;

        Ok(Self::new(config.op_timeout())
            .register(BackendKind::Mongo, Arc::new(mongo))
            .register(BackendKind::Cassandra, Arc::new(cassandra))
            .register(BackendKind::Neo4j, Arc::new(neo4j))
            .register(BackendKind::Redis, Arc::new(redis)))
    }

    /// The registered backend kinds, in canonical order.
    #[must_use]
    pub fn registered(&self) -> Vec<BackendKind> {
        self.backends.keys().copied().collect()
    }

    fn backend(&self, kind: BackendKind) -> Result<Arc<dyn CatalogBackend>> {
        self.backends.get(&kind).cloned().ok_or_else(|| {
            Error::unavailable(kind.as_str(), "backend not registered")
        })
    }

    /// Runs one adapter future under the per-call timeout.
    async fn timed<T>(
        kind: BackendKind,
        timeout: Duration,
        future: OpFuture<T>,
    ) -> Result<T> {
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(Error::unavailable(
                kind.as_str(),
                format!("timed out after {}s", timeout.as_secs()),
            )),
        }
    }

    /// Dispatches one operation to the selected target.
    async fn dispatch<T, F>(&self, target: Target, op: F) -> Result<FanoutResult<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn CatalogBackend>) -> OpFuture<T>,
    {
        match target {
            Target::One(kind) => {
                let backend = self.backend(kind)?;
                let data = Self::timed(kind, self.op_timeout, op(backend)).await?;
                Ok(FanoutResult::Single(data))
            },
            Target::All => {
                let mut tasks = JoinSet::new();
                for (kind, backend) in &self.backends {
                    let kind = *kind;
                    let timeout = self.op_timeout;
                    let future = op(Arc::clone(backend));
                    tasks.spawn(async move { (kind, Self::timed(kind, timeout, future).await) });
                }

                // Join on everything; a failure is recorded, never fatal.
                let mut outcomes = BTreeMap::new();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok((kind, result)) = joined {
                        if let Err(e) = &result {
                            tracing::warn!(backend = %kind, error = %e, "backend call failed");
                        }
                        outcomes.insert(kind, BackendOutcome::from_result(result));
                    }
                }
                // A panicked task lost its kind with it; backfill so the map
                // always covers the registry.
                for kind in self.backends.keys() {
                    outcomes.entry(*kind).or_insert_with(|| BackendOutcome::Failure {
                        error: "backend task aborted".to_string(),
                        kind: ErrorCode::Unavailable,
                    });
                }
                Ok(FanoutResult::All(outcomes))
            },
        }
    }

    /// Inserts a title.
    pub async fn insert_title(
        &self,
        target: Target,
        title: &Title,
    ) -> Result<FanoutResult<()>> {
        let title = title.clone();
        self.dispatch(target, move |backend| {
            let title = title.clone();
            Box::pin(async move { backend.insert_title(&title).await })
        })
        .await
    }

    /// Fetches a title by canonical id.
    pub async fn get_title(&self, target: Target, id: &TitleId) -> Result<FanoutResult<Title>> {
        let id = id.clone();
        self.dispatch(target, move |backend| {
            let id = id.clone();
            Box::pin(async move { backend.get_title(&id).await })
        })
        .await
    }

    /// Searches titles.
    pub async fn search_titles(
        &self,
        target: Target,
        filter: &TitleFilter,
        sort: Sort,
        limit: usize,
    ) -> Result<FanoutResult<Vec<Title>>> {
        let filter = filter.clone();
        self.dispatch(target, move |backend| {
            let filter = filter.clone();
            Box::pin(async move { backend.search_titles(&filter, sort, limit).await })
        })
        .await
    }

    /// Applies a single-field title update.
    pub async fn update_title_field(
        &self,
        target: Target,
        id: &TitleId,
        update: &FieldUpdate,
    ) -> Result<FanoutResult<()>> {
        let id = id.clone();
        let update = update.clone();
        self.dispatch(target, move |backend| {
            let id = id.clone();
            let update = update.clone();
            Box::pin(async move { backend.update_title_field(&id, &update).await })
        })
        .await
    }

    /// Deletes a title with its credit cascade.
    pub async fn delete_title(&self, target: Target, id: &TitleId) -> Result<FanoutResult<()>> {
        let id = id.clone();
        self.dispatch(target, move |backend| {
            let id = id.clone();
            Box::pin(async move { backend.delete_title(&id).await })
        })
        .await
    }

    /// Inserts a person.
    pub async fn insert_person(
        &self,
        target: Target,
        person: &Person,
    ) -> Result<FanoutResult<()>> {
        let person = person.clone();
        self.dispatch(target, move |backend| {
            let person = person.clone();
            Box::pin(async move { backend.insert_person(&person).await })
        })
        .await
    }

    /// Fetches a person by canonical id.
    pub async fn get_person(
        &self,
        target: Target,
        id: &PersonId,
    ) -> Result<FanoutResult<Person>> {
        let id = id.clone();
        self.dispatch(target, move |backend| {
            let id = id.clone();
            Box::pin(async move { backend.get_person(&id).await })
        })
        .await
    }

    /// Records an appearance credit.
    pub async fn insert_credit(
        &self,
        target: Target,
        credit: &Credit,
    ) -> Result<FanoutResult<()>> {
        let credit = credit.clone();
        self.dispatch(target, move |backend| {
            let credit = credit.clone();
            Box::pin(async move { backend.insert_credit(&credit).await })
        })
        .await
    }

    /// All titles for a person (id first, exact-name fallback).
    pub async fn titles_by_person(
        &self,
        target: Target,
        person_ref: &str,
        sort: Sort,
        limit: usize,
    ) -> Result<FanoutResult<Vec<Title>>> {
        let person_ref = person_ref.to_string();
        self.dispatch(target, move |backend| {
            let person_ref = person_ref.clone();
            Box::pin(async move { backend.titles_by_person(&person_ref, sort, limit).await })
        })
        .await
    }

    /// All people credited in a title.
    pub async fn people_by_title(
        &self,
        target: Target,
        id: &TitleId,
    ) -> Result<FanoutResult<Vec<CastMember>>> {
        let id = id.clone();
        self.dispatch(target, move |backend| {
            let id = id.clone();
            Box::pin(async move { backend.people_by_title(&id).await })
        })
        .await
    }

    /// Title counts per release year.
    pub async fn count_by_year(&self, target: Target) -> Result<FanoutResult<Vec<YearCount>>> {
        self.dispatch(target, |backend| {
            Box::pin(async move { backend.count_by_year().await })
        })
        .await
    }

    /// Average rating per genre.
    pub async fn average_rating_by_genre(
        &self,
        target: Target,
    ) -> Result<FanoutResult<Vec<GenreAverage>>> {
        self.dispatch(target, |backend| {
            Box::pin(async move { backend.average_rating_by_genre().await })
        })
        .await
    }

    /// Dispatches an arbitrary closure; the bulk loader builds its composite
    /// reset-and-load step on top of this.
    pub(crate) async fn dispatch_with<T, F>(
        &self,
        target: Target,
        op: F,
    ) -> Result<FanoutResult<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn CatalogBackend>) -> OpFuture<T>,
    {
        self.dispatch(target, op).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use async_trait::async_trait;

    /// Stands in for an unreachable engine: every call fails the way a dead
    /// connection would.
    struct UnreachableBackend;

    #[async_trait]
    impl CatalogBackend for UnreachableBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Redis
        }
        async fn insert_title(&self, _: &Title) -> Result<()> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn get_title(&self, _: &TitleId) -> Result<Title> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn search_titles(&self, _: &TitleFilter, _: Sort, _: usize) -> Result<Vec<Title>> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn update_title_field(&self, _: &TitleId, _: &FieldUpdate) -> Result<()> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn delete_title(&self, _: &TitleId) -> Result<()> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn insert_person(&self, _: &Person) -> Result<()> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn get_person(&self, _: &PersonId) -> Result<Person> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn insert_credit(&self, _: &Credit) -> Result<()> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn titles_by_person(&self, _: &str, _: Sort, _: usize) -> Result<Vec<Title>> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn people_by_title(&self, _: &TitleId) -> Result<Vec<CastMember>> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn count_by_year(&self) -> Result<Vec<YearCount>> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn reset(&self) -> Result<()> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn load_titles(&self, _: &[Title]) -> Result<usize> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn load_people(&self, _: &[Person]) -> Result<usize> {
            Err(Error::unavailable("redis", "connection refused"))
        }
        async fn load_credits(&self, _: &[Credit]) -> Result<usize> {
            Err(Error::unavailable("redis", "connection refused"))
        }
    }

    fn sample_title(id: &str) -> Title {
        Title {
            id: TitleId::new(id),
            name: format!("Title {id}"),
            category: crate::models::TitleCategory::Movie,
            release_year: Some(2012),
            genres: vec!["Action".to_string()],
            rating: Some(7.1),
            votes: Some(900),
            runtime_minutes: Some(120),
            synopsis: None,
        }
    }

    /// Registry of three healthy in-memory backends plus one dead slot.
    fn mixed_catalog() -> Catalog {
        Catalog::new(Duration::from_secs(5))
            .register(BackendKind::Mongo, Arc::new(MemoryBackend::default()))
            .register(BackendKind::Cassandra, Arc::new(MemoryBackend::default()))
            .register(BackendKind::Neo4j, Arc::new(MemoryBackend::default()))
            .register(BackendKind::Redis, Arc::new(UnreachableBackend))
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse("all").unwrap(), Target::All);
        assert_eq!(
            Target::parse("neo4j").unwrap(),
            Target::One(BackendKind::Neo4j)
        );
        assert!(Target::parse("everything").is_err());
    }

    #[tokio::test]
    async fn test_single_target_error_propagates() {
        let catalog = mixed_catalog();
        let err = catalog
            .get_title(Target::One(BackendKind::Mongo), &TitleId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = catalog
            .get_title(Target::One(BackendKind::Redis), &TitleId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn test_all_mode_tolerates_one_dead_backend() {
        let catalog = mixed_catalog();
        let title = sample_title("tt1");

        let result = catalog.insert_title(Target::All, &title).await.unwrap();
        let map = result.per_backend().unwrap();
        assert_eq!(map.len(), 4);
        assert!(map[&BackendKind::Mongo].data().is_some());
        assert!(map[&BackendKind::Cassandra].data().is_some());
        assert!(map[&BackendKind::Neo4j].data().is_some());
        assert_eq!(
            map[&BackendKind::Redis].error_kind(),
            Some(ErrorCode::Unavailable)
        );

        // The healthy backends really did apply the write.
        let fetched = catalog
            .get_title(Target::One(BackendKind::Neo4j), &title.id)
            .await
            .unwrap();
        assert_eq!(fetched.into_single().unwrap().id, title.id);
    }

    #[tokio::test]
    async fn test_all_mode_map_reports_not_found_per_backend() {
        let catalog = mixed_catalog();
        catalog
            .insert_title(Target::One(BackendKind::Mongo), &sample_title("tt1"))
            .await
            .unwrap();

        let result = catalog
            .get_title(Target::All, &TitleId::new("tt1"))
            .await
            .unwrap();
        let map = result.per_backend().unwrap();
        assert!(map[&BackendKind::Mongo].data().is_some());
        assert_eq!(
            map[&BackendKind::Cassandra].error_kind(),
            Some(ErrorCode::NotFound)
        );
        assert_eq!(
            map[&BackendKind::Redis].error_kind(),
            Some(ErrorCode::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_timeout_reports_unavailable_for_that_backend_only() {
        /// Hangs forever on search; everything else unused.
        struct HangingBackend(MemoryBackend);

        #[async_trait]
        impl CatalogBackend for HangingBackend {
            fn kind(&self) -> BackendKind {
                BackendKind::Cassandra
            }
            async fn search_titles(
                &self,
                _: &TitleFilter,
                _: Sort,
                _: usize,
            ) -> Result<Vec<Title>> {
                std::future::pending().await
            }
            async fn insert_title(&self, t: &Title) -> Result<()> {
                self.0.insert_title(t).await
            }
            async fn get_title(&self, id: &TitleId) -> Result<Title> {
                self.0.get_title(id).await
            }
            async fn update_title_field(&self, id: &TitleId, u: &FieldUpdate) -> Result<()> {
                self.0.update_title_field(id, u).await
            }
            async fn delete_title(&self, id: &TitleId) -> Result<()> {
                self.0.delete_title(id).await
            }
            async fn insert_person(&self, p: &Person) -> Result<()> {
                self.0.insert_person(p).await
            }
            async fn get_person(&self, id: &PersonId) -> Result<Person> {
                self.0.get_person(id).await
            }
            async fn insert_credit(&self, c: &Credit) -> Result<()> {
                self.0.insert_credit(c).await
            }
            async fn titles_by_person(&self, r: &str, s: Sort, l: usize) -> Result<Vec<Title>> {
                self.0.titles_by_person(r, s, l).await
            }
            async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>> {
                self.0.people_by_title(id).await
            }
            async fn count_by_year(&self) -> Result<Vec<YearCount>> {
                self.0.count_by_year().await
            }
            async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
                self.0.average_rating_by_genre().await
            }
            async fn reset(&self) -> Result<()> {
                self.0.reset().await
            }
            async fn load_titles(&self, t: &[Title]) -> Result<usize> {
                self.0.load_titles(t).await
            }
            async fn load_people(&self, p: &[Person]) -> Result<usize> {
                self.0.load_people(p).await
            }
            async fn load_credits(&self, c: &[Credit]) -> Result<usize> {
                self.0.load_credits(c).await
            }
        }

        let catalog = Catalog::new(Duration::from_millis(50))
            .register(BackendKind::Mongo, Arc::new(MemoryBackend::default()))
            .register(
                BackendKind::Cassandra,
                Arc::new(HangingBackend(MemoryBackend::default())),
            );

        let result = catalog
            .search_titles(Target::All, &TitleFilter::new(), Sort::default(), 10)
            .await
            .unwrap();
        let map = result.per_backend().unwrap();
        assert!(map[&BackendKind::Mongo].data().is_some());
        assert_eq!(
            map[&BackendKind::Cassandra].error_kind(),
            Some(ErrorCode::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_envelope_serialization_shape() {
        let catalog = mixed_catalog();
        let result = catalog
            .get_title(Target::All, &TitleId::new("missing"))
            .await
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();

        // Failures expose {error, kind}; the envelope is keyed by backend.
        assert_eq!(json["redis"]["kind"], "backend_unavailable");
        assert_eq!(json["mongo"]["kind"], "not_found");
        assert!(json["mongo"]["error"].is_string());
    }
}
