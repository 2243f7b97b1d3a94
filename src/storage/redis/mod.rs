//! Redis key-value adapter.
//!
//! Entities are hashes keyed by canonical id. The engine has no query
//! language, so searchability is hand-built at write time: one set per genre
//! and per category, a sorted set scored by release year, and a name set per
//! person for the lookup fallback. Searches intersect the relevant index
//! sets into a candidate id set, hydrate the candidates, and run the shared
//! matcher over the remainder; with no indexed field in the filter, a key
//! scan takes over.
//!
//! The person↔title relation is maintained by [`cast_index`]: every credit
//! mutation updates both reverse-lookup sets and the role entry in one
//! pipeline, never one side at a time.

pub mod cast_index;

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, Title, TitleCategory,
    TitleFilter, TitleId, YearCount,
};
use crate::query::{self, SearchPolicy};
use crate::storage::{BackendKind, CatalogBackend};
use crate::{Error, Result};

use cast_index::CastIndex;

const TITLE_PREFIX: &str = "title:";
const PERSON_PREFIX: &str = "person:";
const IDX_GENRE_PREFIX: &str = "idx:title:genre:";
const IDX_CATEGORY_PREFIX: &str = "idx:title:category:";
const IDX_YEAR_KEY: &str = "idx:title:year";
const IDX_PERSON_NAME_PREFIX: &str = "idx:person:name:";

/// Redis-backed catalog adapter.
///
/// Holds one multiplexed connection manager; clones are cheap handles onto
/// the same connection and safe for concurrent reads.
pub struct RedisBackend {
    conn: ConnectionManager,
    policy: SearchPolicy,
}

fn title_key(id: &TitleId) -> String {
    format!("{TITLE_PREFIX}{id}")
}

fn person_key(id: &PersonId) -> String {
    format!("{PERSON_PREFIX}{id}")
}

fn genre_idx(genre: &str) -> String {
    format!("{IDX_GENRE_PREFIX}{genre}")
}

fn category_idx(category: &TitleCategory) -> String {
    format!("{IDX_CATEGORY_PREFIX}{}", category.as_str())
}

fn person_name_idx(name: &str) -> String {
    format!("{IDX_PERSON_NAME_PREFIX}{}", name.to_lowercase())
}

fn map_err(e: impl std::fmt::Display) -> Error {
    Error::unavailable("redis", e)
}

/// Serializes a title into hash fields; absent optionals are omitted.
fn title_fields(title: &Title) -> Vec<(String, String)> {
    let mut fields = vec![
        ("name".to_string(), title.name.clone()),
        ("category".to_string(), title.category.as_str().to_string()),
        (
            "genres".to_string(),
            serde_json::to_string(&title.genres).unwrap_or_default(),
        ),
    ];
    if let Some(year) = title.release_year {
        fields.push(("release_year".to_string(), year.to_string()));
    }
    if let Some(rating) = title.rating {
        fields.push(("rating".to_string(), rating.to_string()));
    }
    if let Some(votes) = title.votes {
        fields.push(("votes".to_string(), votes.to_string()));
    }
    if let Some(minutes) = title.runtime_minutes {
        fields.push(("runtime_minutes".to_string(), minutes.to_string()));
    }
    if let Some(synopsis) = &title.synopsis {
        fields.push(("synopsis".to_string(), synopsis.clone()));
    }
    fields
}

fn parse_title(id: TitleId, hash: &HashMap<String, String>) -> Title {
    Title {
        id,
        name: hash.get("name").cloned().unwrap_or_default(),
        category: TitleCategory::parse(hash.get("category").map_or("", String::as_str)),
        release_year: hash.get("release_year").and_then(|v| v.parse().ok()),
        genres: hash
            .get("genres")
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default(),
        rating: hash.get("rating").and_then(|v| v.parse().ok()),
        votes: hash.get("votes").and_then(|v| v.parse().ok()),
        runtime_minutes: hash.get("runtime_minutes").and_then(|v| v.parse().ok()),
        synopsis: hash.get("synopsis").cloned(),
    }
}

fn parse_person(id: PersonId, hash: &HashMap<String, String>) -> Person {
    Person {
        id,
        name: hash.get("name").cloned().unwrap_or_default(),
        birth_year: hash.get("birth_year").and_then(|v| v.parse().ok()),
    }
}

/// Queues the index writes accompanying a fresh title hash.
fn queue_title_indexes(pipe: &mut redis::Pipeline, title: &Title) {
    let id = title.id.as_str();
    for genre in &title.genres {
        pipe.sadd(genre_idx(genre), id).ignore();
    }
    pipe.sadd(category_idx(&title.category), id).ignore();
    if let Some(year) = title.release_year {
        pipe.zadd(IDX_YEAR_KEY, id, year).ignore();
    }
}

impl RedisBackend {
    /// Connects and verifies the server answers a ping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the URL is invalid or the server
    /// is unreachable.
    pub async fn connect(config: &RedisConfig, policy: SearchPolicy) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(map_err)?;
        let mut conn = client.get_connection_manager().await.map_err(map_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(Self { conn, policy })
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> =
            conn.scan_match(pattern).await.map_err(map_err)?;
        while let Some(key) = iter.next_item().await {
            keys.push(key.map_err(map_err)?);
        }
        Ok(keys)
    }

    async fn get_title_opt(&self, id: &TitleId) -> Result<Option<Title>> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> =
            conn.hgetall(title_key(id)).await.map_err(map_err)?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_title(id.clone(), &hash)))
    }

    /// Hydrates every stored title; the fallback path for unindexed
    /// searches and the aggregate scans.
    async fn scan_titles(&self) -> Result<Vec<Title>> {
        let keys = self.scan_keys(&format!("{TITLE_PREFIX}*")).await?;
        let mut titles = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(id) = key.strip_prefix(TITLE_PREFIX) else {
                continue;
            };
            if let Some(title) = self.get_title_opt(&TitleId::new(id)).await? {
                titles.push(title);
            }
        }
        Ok(titles)
    }

    async fn resolve_person_id(&self, person_ref: &str) -> Result<Option<PersonId>> {
        let mut conn = self.conn.clone();
        let by_id = PersonId::new(person_ref);
        let exists: bool = conn.exists(person_key(&by_id)).await.map_err(map_err)?;
        if exists {
            return Ok(Some(by_id));
        }
        let mut ids: Vec<String> = conn
            .smembers(person_name_idx(person_ref))
            .await
            .map_err(map_err)?;
        ids.sort();
        Ok(ids.into_iter().next().map(PersonId::new))
    }

    /// Resolves the indexed filter fields into a candidate id set.
    ///
    /// `None` means no indexed field participates and the caller must scan;
    /// an empty set is a definitive empty result.
    async fn candidate_ids(&self, filter: &TitleFilter) -> Result<Option<BTreeSet<String>>> {
        let mut conn = self.conn.clone();
        let mut candidates: Option<BTreeSet<String>> = None;

        let mut set_keys: Vec<String> = Vec::new();
        if let Some(category) = &filter.category {
            set_keys.push(category_idx(category));
        }
        for genre in &filter.genres_all {
            set_keys.push(genre_idx(genre));
        }
        if !set_keys.is_empty() {
            let ids: Vec<String> = conn.sinter(&set_keys).await.map_err(map_err)?;
            candidates = Some(ids.into_iter().collect());
        }

        if let Some(year_min) = filter.year_min {
            let ids: Vec<String> = conn
                .zrangebyscore(IDX_YEAR_KEY, f64::from(year_min), "+inf")
                .await
                .map_err(map_err)?;
            let by_year: BTreeSet<String> = ids.into_iter().collect();
            candidates = Some(match candidates {
                Some(existing) => existing.intersection(&by_year).cloned().collect(),
                None => by_year,
            });
        }

        Ok(candidates)
    }
}

#[async_trait]
impl CatalogBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn insert_title(&self, title: &Title) -> Result<()> {
        title.validate()?;
        let mut conn = self.conn.clone();
        let key = title_key(&title.id);
        let exists: bool = conn.exists(&key).await.map_err(map_err)?;
        if exists {
            return Err(Error::AlreadyExists(format!("title '{}'", title.id)));
        }

        // Hash and every derived index entry land in one atomic pipeline.
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, &title_fields(title)).ignore();
        queue_title_indexes(&mut pipe, title);
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn get_title(&self, id: &TitleId) -> Result<Title> {
        self.get_title_opt(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("title '{id}'")))
    }

    async fn search_titles(
        &self,
        filter: &TitleFilter,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>> {
        let mut candidates = match self.candidate_ids(filter).await? {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => {
                let mut titles = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(title) = self.get_title_opt(&TitleId::new(id)).await? {
                        titles.push(title);
                    }
                }
                titles
            },
            None => {
                tracing::debug!(
                    target: "polystore::redis",
                    "no indexed filter field, falling back to a key scan"
                );
                self.scan_titles().await?
            },
        };

        candidates.retain(|title| query::title_matches(title, filter, self.policy));
        query::sort_and_truncate(&mut candidates, sort, limit);
        Ok(candidates)
    }

    async fn update_title_field(&self, id: &TitleId, update: &FieldUpdate) -> Result<()> {
        let old = self
            .get_title_opt(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("title '{id}'")))?;
        let key = title_key(id);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        // Index-backed fields rewrite their entries alongside the hash.
        match update {
            FieldUpdate::Genres(new_genres) => {
                let old_set: BTreeSet<&String> = old.genres.iter().collect();
                let new_set: BTreeSet<&String> = new_genres.iter().collect();
                for removed in old_set.difference(&new_set) {
                    pipe.srem(genre_idx(removed), id.as_str()).ignore();
                }
                for added in new_set.difference(&old_set) {
                    pipe.sadd(genre_idx(added), id.as_str()).ignore();
                }
                pipe.hset(
                    &key,
                    "genres",
                    serde_json::to_string(new_genres).unwrap_or_default(),
                )
                .ignore();
            },
            FieldUpdate::Category(new_category) => {
                pipe.srem(category_idx(&old.category), id.as_str()).ignore();
                pipe.sadd(category_idx(new_category), id.as_str()).ignore();
                pipe.hset(&key, "category", new_category.as_str()).ignore();
            },
            FieldUpdate::ReleaseYear(new_year) => match new_year {
                Some(year) => {
                    pipe.zadd(IDX_YEAR_KEY, id.as_str(), *year).ignore();
                    pipe.hset(&key, "release_year", year.to_string()).ignore();
                },
                None => {
                    pipe.zrem(IDX_YEAR_KEY, id.as_str()).ignore();
                    pipe.hdel(&key, "release_year").ignore();
                },
            },
            FieldUpdate::Name(name) => {
                pipe.hset(&key, "name", name).ignore();
            },
            FieldUpdate::Rating(value) => {
                match value {
                    Some(rating) => pipe.hset(&key, "rating", rating.to_string()),
                    None => pipe.hdel(&key, "rating"),
                }
                .ignore();
            },
            FieldUpdate::Votes(value) => {
                match value {
                    Some(votes) => pipe.hset(&key, "votes", votes.to_string()),
                    None => pipe.hdel(&key, "votes"),
                }
                .ignore();
            },
            FieldUpdate::RuntimeMinutes(value) => {
                match value {
                    Some(minutes) => pipe.hset(&key, "runtime_minutes", minutes.to_string()),
                    None => pipe.hdel(&key, "runtime_minutes"),
                }
                .ignore();
            },
            FieldUpdate::Synopsis(value) => {
                match value {
                    Some(synopsis) => pipe.hset(&key, "synopsis", synopsis),
                    None => pipe.hdel(&key, "synopsis"),
                }
                .ignore();
            },
        }

        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn delete_title(&self, id: &TitleId) -> Result<()> {
        let old = self
            .get_title_opt(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("title '{id}'")))?;
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn
            .smembers(CastIndex::title_key(id))
            .await
            .map_err(map_err)?;
        let member_ids: Vec<PersonId> = members.into_iter().map(PersonId::new).collect();

        // Hash, secondary indexes, and the whole cast cascade in one
        // pipeline, so no partial derived state survives the call.
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(title_key(id)).ignore();
        for genre in &old.genres {
            pipe.srem(genre_idx(genre), id.as_str()).ignore();
        }
        pipe.srem(category_idx(&old.category), id.as_str()).ignore();
        pipe.zrem(IDX_YEAR_KEY, id.as_str()).ignore();
        cast_index::apply(&mut pipe, &CastIndex::unlink_title(id, &member_ids));
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn insert_person(&self, person: &Person) -> Result<()> {
        person.validate()?;
        let mut conn = self.conn.clone();
        let key = person_key(&person.id);
        let exists: bool = conn.exists(&key).await.map_err(map_err)?;
        if exists {
            return Err(Error::AlreadyExists(format!("person '{}'", person.id)));
        }

        let mut fields = vec![("name".to_string(), person.name.clone())];
        if let Some(year) = person.birth_year {
            fields.push(("birth_year".to_string(), year.to_string()));
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, &fields).ignore();
        pipe.sadd(person_name_idx(&person.name), person.id.as_str())
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn get_person(&self, id: &PersonId) -> Result<Person> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> =
            conn.hgetall(person_key(id)).await.map_err(map_err)?;
        if hash.is_empty() {
            return Err(Error::NotFound(format!("person '{id}'")));
        }
        Ok(parse_person(id.clone(), &hash))
    }

    async fn insert_credit(&self, credit: &Credit) -> Result<()> {
        credit.validate()?;
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        cast_index::apply(&mut pipe, &CastIndex::link(credit));
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn titles_by_person(
        &self,
        person_ref: &str,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>> {
        let Some(person_id) = self.resolve_person_id(person_ref).await? else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let title_ids: Vec<String> = conn
            .smembers(CastIndex::person_key(&person_id))
            .await
            .map_err(map_err)?;

        let mut titles = Vec::with_capacity(title_ids.len());
        for title_id in title_ids {
            if let Some(title) = self.get_title_opt(&TitleId::new(title_id)).await? {
                titles.push(title);
            }
        }
        query::sort_and_truncate(&mut titles, sort, limit);
        Ok(titles)
    }

    async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>> {
        let mut conn = self.conn.clone();
        let mut person_ids: Vec<String> = conn
            .smembers(CastIndex::title_key(id))
            .await
            .map_err(map_err)?;
        person_ids.sort();

        let mut members = Vec::with_capacity(person_ids.len());
        for person_id in person_ids {
            let person_id = PersonId::new(person_id);
            let hash: HashMap<String, String> = conn
                .hgetall(person_key(&person_id))
                .await
                .map_err(map_err)?;
            if hash.is_empty() {
                continue;
            }
            let role: Option<String> = conn
                .get(CastIndex::role_key(id, &person_id))
                .await
                .map_err(map_err)?;
            members.push(CastMember {
                person: parse_person(person_id, &hash),
                role: role.filter(|r| !r.is_empty()),
            });
        }
        Ok(members)
    }

    async fn count_by_year(&self) -> Result<Vec<YearCount>> {
        // The year index already holds (id, year) pairs; counting is a
        // single sorted-set read.
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = conn
            .zrange_withscores(IDX_YEAR_KEY, 0, -1)
            .await
            .map_err(map_err)?;
        let mut counts: std::collections::BTreeMap<i32, u64> = std::collections::BTreeMap::new();
        for (_, score) in entries {
            #[allow(clippy::cast_possible_truncation)]
            let year = score as i32;
            *counts.entry(year).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(year, count)| YearCount { year, count })
            .collect())
    }

    async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
        let titles = self.scan_titles().await?;
        Ok(query::average_rating_by_genre(&titles))
    }

    async fn reset(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let patterns = [
            format!("{TITLE_PREFIX}*"),
            format!("{PERSON_PREFIX}*"),
            format!("{}*", cast_index::CAST_BY_TITLE_PREFIX),
            format!("{}*", cast_index::CAST_BY_PERSON_PREFIX),
            format!("{}*", cast_index::ROLE_PREFIX),
            format!("{IDX_GENRE_PREFIX}*"),
            format!("{IDX_CATEGORY_PREFIX}*"),
            format!("{IDX_PERSON_NAME_PREFIX}*"),
        ];
        for pattern in patterns {
            let keys = self.scan_keys(&pattern).await?;
            if !keys.is_empty() {
                let _: () = conn.del(keys).await.map_err(map_err)?;
            }
        }
        let _: () = conn.del(IDX_YEAR_KEY).await.map_err(map_err)?;
        Ok(())
    }

    async fn load_titles(&self, titles: &[Title]) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for title in titles {
            pipe.hset_multiple(title_key(&title.id), &title_fields(title))
                .ignore();
            queue_title_indexes(&mut pipe, title);
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(titles.len())
    }

    async fn load_people(&self, people: &[Person]) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for person in people {
            let mut fields = vec![("name".to_string(), person.name.clone())];
            if let Some(year) = person.birth_year {
                fields.push(("birth_year".to_string(), year.to_string()));
            }
            pipe.hset_multiple(person_key(&person.id), &fields).ignore();
            pipe.sadd(person_name_idx(&person.name), person.id.as_str())
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(people.len())
    }

    async fn load_credits(&self, credits: &[Credit]) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for credit in credits {
            cast_index::apply(&mut pipe, &CastIndex::link(credit));
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
        Ok(credits.len())
    }
}
