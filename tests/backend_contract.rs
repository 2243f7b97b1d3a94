//! Backend contract tests.
//!
//! Runs the same operation-contract suite against each live engine. Every
//! engine is optional: set the matching environment variable to enable its
//! suite, otherwise it is skipped.
//!
//! ```bash
//! export POLYSTORE_TEST_MONGO_URI="mongodb://localhost:27017"
//! export POLYSTORE_TEST_CASSANDRA_NODE="127.0.0.1:9042"
//! export POLYSTORE_TEST_NEO4J_URI="bolt://localhost:7687"
//! export POLYSTORE_TEST_REDIS_URL="redis://localhost:6379"
//! cargo test --test backend_contract
//! ```
//!
//! The suites write to dedicated test databases/keyspaces and reset them at
//! the start of each run.

// Integration tests use expect/unwrap for simplicity.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::env;

use polystore::models::{CastMember, Credit, FieldUpdate, Person, PersonId, Title, TitleId};
use polystore::{
    CatalogBackend, Error, Sort, SortDirection, SortField, TitleCategory, TitleFilter,
};

/// Macro to skip a suite when its engine is not available.
macro_rules! require_env {
    ($var:expr) => {
        match env::var($var) {
            Ok(value) => value,
            Err(_) => {
                eprintln!(
                    "Skipping test: {} not set. Set this environment variable to run it.",
                    $var
                );
                return;
            },
        }
    };
}

fn title(id: &str, year: Option<i32>, rating: Option<f64>, votes: Option<i64>) -> Title {
    Title {
        id: TitleId::new(id),
        name: format!("Contract Title {id}"),
        category: TitleCategory::Movie,
        release_year: year,
        genres: vec!["Action".to_string()],
        rating,
        votes,
        runtime_minutes: Some(110),
        synopsis: Some("Contract test fixture.".to_string()),
    }
}

fn person(id: &str, name: &str) -> Person {
    Person {
        id: PersonId::new(id),
        name: name.to_string(),
        birth_year: Some(1980),
    }
}

fn credit(person_id: &str, title_id: &str, role: &str) -> Credit {
    Credit {
        person_id: PersonId::new(person_id),
        title_id: TitleId::new(title_id),
        role: role.to_string(),
    }
}

/// The full operation-contract suite, engine-agnostic.
async fn exercise_contract(backend: &dyn CatalogBackend) {
    backend.reset().await.expect("reset");

    // Round-trip: insert then get returns an equal record.
    let original = title("ct1", Some(2010), Some(7.5), Some(1500));
    backend.insert_title(&original).await.expect("insert");
    let fetched = backend.get_title(&original.id).await.expect("get");
    assert_eq!(fetched, original);

    // Duplicate insert fails and leaves the first record unchanged.
    let mut replacement = original.clone();
    replacement.name = "Replacement".to_string();
    let err = backend.insert_title(&replacement).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)), "got {err:?}");
    assert_eq!(
        backend.get_title(&original.id).await.unwrap().name,
        original.name
    );

    // Unknown id is NotFound, not a transport error.
    let err = backend.get_title(&TitleId::new("ct-missing")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    // Field update round-trips and NotFound surfaces for unknown ids.
    backend
        .update_title_field(&original.id, &FieldUpdate::Rating(Some(8.8)))
        .await
        .expect("update");
    assert_eq!(
        backend.get_title(&original.id).await.unwrap().rating,
        Some(8.8)
    );
    let err = backend
        .update_title_field(&TitleId::new("ct-missing"), &FieldUpdate::Rating(None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Future-release exception: an unevaluated 2026 title passes a high
    // rating bound, an ordinary low-rated title does not.
    let future = title("ct-x1", Some(2026), Some(0.0), Some(0));
    let low_rated = title("ct-x2", Some(2010), Some(3.0), Some(700));
    backend.insert_title(&future).await.expect("insert future");
    backend.insert_title(&low_rated).await.expect("insert low");

    let filter = TitleFilter::new()
        .with_rating_min(8.0)
        .with_genre("Action");
    let results = backend
        .search_titles(&filter, Sort::rating_desc(), 50)
        .await
        .expect("search");
    let ids: Vec<&str> = results.iter().map(|t| t.id.as_str()).collect();
    assert!(ids.contains(&"ct-x1"), "future exception failed: {ids:?}");
    assert!(!ids.contains(&"ct-x2"));
    assert!(ids.contains(&"ct1"));

    // Category is an exact predicate everywhere.
    let filter = TitleFilter::new().with_category(TitleCategory::Series);
    let results = backend
        .search_titles(&filter, Sort::rating_desc(), 50)
        .await
        .unwrap();
    assert!(results.is_empty());

    // Relationships: traversal in both directions, with the name fallback.
    let alice = person("ct-nm1", "Alice Contract");
    backend.insert_person(&alice).await.expect("insert person");
    assert_eq!(backend.get_person(&alice.id).await.unwrap(), alice);

    backend
        .insert_credit(&credit("ct-nm1", "ct1", "Lead"))
        .await
        .expect("credit");
    backend
        .insert_credit(&credit("ct-nm1", "ct-x1", "Cameo"))
        .await
        .expect("credit");

    let by_id = backend
        .titles_by_person("ct-nm1", Sort::year_desc(), 10)
        .await
        .unwrap();
    assert_eq!(by_id.len(), 2);
    assert_eq!(by_id[0].id.as_str(), "ct-x1"); // 2026 before 2010

    let by_name = backend
        .titles_by_person("Alice Contract", Sort::year_desc(), 10)
        .await
        .unwrap();
    assert_eq!(by_id, by_name);

    // Unknown person: empty list, not an error.
    let none = backend
        .titles_by_person("nonexistent-id", Sort::year_desc(), 10)
        .await
        .unwrap();
    assert!(none.is_empty());

    // Credit re-insertion overwrites the role instead of duplicating.
    backend
        .insert_credit(&credit("ct-nm1", "ct1", "Director"))
        .await
        .unwrap();
    let cast: Vec<CastMember> = backend.people_by_title(&TitleId::new("ct1")).await.unwrap();
    assert_eq!(cast.len(), 1);
    assert_eq!(cast[0].person.id.as_str(), "ct-nm1");
    assert_eq!(cast[0].role.as_deref(), Some("Director"));

    // Aggregations reflect the inserted data.
    let counts = backend.count_by_year().await.unwrap();
    let for_2010 = counts.iter().find(|c| c.year == 2010).expect("2010 bucket");
    assert_eq!(for_2010.count, 2);
    let averages = backend.average_rating_by_genre().await.unwrap();
    assert!(averages.iter().any(|g| g.genre == "Action"));

    // Delete cascades: the title disappears from lookup and from every
    // person's traversal on the same backend.
    backend.delete_title(&TitleId::new("ct1")).await.expect("delete");
    assert!(matches!(
        backend.get_title(&TitleId::new("ct1")).await,
        Err(Error::NotFound(_))
    ));
    let remaining = backend
        .titles_by_person("ct-nm1", Sort::year_desc(), 10)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id.as_str(), "ct-x1");
    let cast = backend.people_by_title(&TitleId::new("ct1")).await.unwrap();
    assert!(cast.is_empty());

    // Deleting twice reports NotFound.
    let err = backend.delete_title(&TitleId::new("ct1")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Sort semantics: missing years lead in both directions.
    let unknown_year = title("ct-ny", None, Some(5.0), Some(10));
    backend.insert_title(&unknown_year).await.unwrap();
    let asc = backend
        .search_titles(
            &TitleFilter::new(),
            Sort::new(SortField::ReleaseYear, SortDirection::Asc),
            50,
        )
        .await
        .unwrap();
    assert_eq!(asc.first().map(|t| t.id.as_str()), Some("ct-ny"));
}

mod mongo {
    use super::*;
    use polystore::config::MongoConfig;
    use polystore::storage::mongo::MongoBackend;
    use polystore::SearchPolicy;

    #[tokio::test]
    async fn contract() {
        let uri = require_env!("POLYSTORE_TEST_MONGO_URI");
        let config = MongoConfig {
            uri,
            database: "polystore_contract_test".to_string(),
        };
        let backend = MongoBackend::connect(&config, SearchPolicy::default())
            .await
            .expect("connect mongo");
        exercise_contract(&backend).await;
    }
}

mod cassandra {
    use super::*;
    use polystore::config::CassandraConfig;
    use polystore::storage::cassandra::CassandraBackend;
    use polystore::SearchPolicy;

    #[tokio::test]
    async fn contract() {
        let node = require_env!("POLYSTORE_TEST_CASSANDRA_NODE");
        let config = CassandraConfig {
            node,
            keyspace: "polystore_contract_test".to_string(),
        };
        let backend = CassandraBackend::connect(&config, SearchPolicy::default(), 5000)
            .await
            .expect("connect cassandra");
        exercise_contract(&backend).await;
    }
}

mod neo4j {
    use super::*;
    use polystore::config::Neo4jConfig;
    use polystore::storage::neo4j::Neo4jBackend;
    use polystore::SearchPolicy;

    #[tokio::test]
    async fn contract() {
        let uri = require_env!("POLYSTORE_TEST_NEO4J_URI");
        let config = Neo4jConfig {
            uri,
            user: env::var("POLYSTORE_TEST_NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
            password: env::var("POLYSTORE_TEST_NEO4J_PASSWORD")
                .unwrap_or_else(|_| "neo4j".to_string()),
        };
        let backend = Neo4jBackend::connect(&config, SearchPolicy::default())
            .await
            .expect("connect neo4j");
        exercise_contract(&backend).await;
    }
}

mod redis_suite {
    use super::*;
    use polystore::config::RedisConfig;
    use polystore::storage::redis::RedisBackend;
    use polystore::SearchPolicy;

    #[tokio::test]
    async fn contract() {
        let url = require_env!("POLYSTORE_TEST_REDIS_URL");
        let config = RedisConfig { url };
        let backend = RedisBackend::connect(&config, SearchPolicy::default())
            .await
            .expect("connect redis");
        exercise_contract(&backend).await;
    }
}

mod memory {
    use super::*;
    use polystore::storage::memory::MemoryBackend;

    /// The reference backend always runs; it pins the contract the live
    /// suites are compared against.
    #[tokio::test]
    async fn contract() {
        let backend = MemoryBackend::default();
        exercise_contract(&backend).await;
    }
}
