//! Cassandra/Scylla wide-column adapter.
//!
//! The least expressive query engine of the four: only equality on the
//! indexed `category` column is pushed down, and even that only narrows the
//! scan. Everything else (substring, set containment, range bounds, the
//! future-release exception) runs through the shared matcher over a
//! candidate set bounded by an explicit fetch cap.
//!
//! Credits are denormalized into two tables partitioned by each side of the
//! relation (`credits_by_person`, `credits_by_title`); every credit mutation
//! writes both, and a title delete walks the reverse table to retract the
//! forward rows.

use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::batch::Batch;

use crate::config::CassandraConfig;
use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, Title, TitleCategory,
    TitleFilter, TitleId, YearCount,
};
use crate::query::{self, SearchPolicy};
use crate::storage::{BackendKind, CatalogBackend};
use crate::{Error, Result};

/// Statements creating the keyspace-local schema, run once at connect time.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS titles (
        id text PRIMARY KEY,
        name text,
        category text,
        release_year int,
        genres list<text>,
        rating double,
        votes bigint,
        runtime_minutes int,
        synopsis text
    )",
    "CREATE INDEX IF NOT EXISTS titles_category_idx ON titles (category)",
    "CREATE TABLE IF NOT EXISTS people (
        id text PRIMARY KEY,
        name text,
        birth_year int
    )",
    "CREATE TABLE IF NOT EXISTS credits_by_person (
        person_id text,
        title_id text,
        role text,
        PRIMARY KEY (person_id, title_id)
    )",
    "CREATE TABLE IF NOT EXISTS credits_by_title (
        title_id text,
        person_id text,
        role text,
        PRIMARY KEY (title_id, person_id)
    )",
];

const TITLE_COLUMNS: &str =
    "id, name, category, release_year, genres, rating, votes, runtime_minutes, synopsis";

/// Raw row shape of the titles table, in `TITLE_COLUMNS` order.
type TitleRow = (
    String,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<Vec<String>>,
    Option<f64>,
    Option<i64>,
    Option<i32>,
    Option<String>,
);

/// Cassandra-backed catalog adapter.
pub struct CassandraBackend {
    session: Session,
    policy: SearchPolicy,
    /// Upper bound on rows pulled into the in-process filter.
    fetch_cap: i32,
}

impl CassandraBackend {
    /// Connects, creates the keyspace and schema, and selects the keyspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the contact point is unreachable
    /// or schema setup fails.
    pub async fn connect(
        config: &CassandraConfig,
        policy: SearchPolicy,
        fetch_cap: usize,
    ) -> Result<Self> {
        let session = SessionBuilder::new()
            .known_node(&config.node)
            .build()
            .await
            .map_err(|e| Error::unavailable("cassandra", e))?;

        let create_keyspace = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
            config.keyspace
        );
        session
            .query_unpaged(create_keyspace, ())
            .await
            .map_err(|e| Error::unavailable("cassandra", e))?;
        session
            .use_keyspace(&config.keyspace, false)
            .await
            .map_err(|e| Error::unavailable("cassandra", e))?;
        for statement in SCHEMA {
            session
                .query_unpaged(*statement, ())
                .await
                .map_err(|e| Error::unavailable("cassandra", e))?;
        }

        Ok(Self {
            session,
            policy,
            fetch_cap: i32::try_from(fetch_cap).unwrap_or(i32::MAX),
        })
    }

    fn map_err(e: impl std::fmt::Display) -> Error {
        Error::unavailable("cassandra", e)
    }

    fn row_to_title(row: TitleRow) -> Title {
        let (id, name, category, release_year, genres, rating, votes, runtime_minutes, synopsis) =
            row;
        Title {
            id: TitleId::new(id),
            name: name.unwrap_or_default(),
            category: TitleCategory::parse(category.as_deref().unwrap_or("")),
            release_year,
            genres: genres.unwrap_or_default(),
            rating,
            votes,
            runtime_minutes,
            synopsis,
        }
    }

    /// Runs a title select and maps every row.
    async fn fetch_titles(
        &self,
        cql: String,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<Vec<Title>> {
        let result = self
            .session
            .query_unpaged(cql, values)
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        let mut titles = Vec::new();
        for row in result.rows::<TitleRow>().map_err(Self::map_err)? {
            titles.push(Self::row_to_title(row.map_err(Self::map_err)?));
        }
        Ok(titles)
    }

    async fn title_exists(&self, id: &TitleId) -> Result<bool> {
        let result = self
            .session
            .query_unpaged("SELECT id FROM titles WHERE id = ?", (id.as_str(),))
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        Ok(result.rows_num() > 0)
    }

    async fn resolve_person_id(&self, person_ref: &str) -> Result<Option<PersonId>> {
        let by_id = self
            .session
            .query_unpaged("SELECT id FROM people WHERE id = ?", (person_ref,))
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        if let Some(row) = by_id.maybe_first_row::<(String,)>().map_err(Self::map_err)? {
            return Ok(Some(PersonId::new(row.0)));
        }

        // Name fallback scans; acceptable at demo scale, and the shared
        // contract requires the same id-then-name order everywhere.
        let by_name = self
            .session
            .query_unpaged(
                "SELECT id FROM people WHERE name = ? ALLOW FILTERING",
                (person_ref,),
            )
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        Ok(by_name
            .maybe_first_row::<(String,)>()
            .map_err(Self::map_err)?
            .map(|row| PersonId::new(row.0)))
    }

    async fn get_title_opt(&self, id: &TitleId) -> Result<Option<Title>> {
        let cql = format!("SELECT {TITLE_COLUMNS} FROM titles WHERE id = ?");
        let mut titles = self.fetch_titles(cql, (id.as_str(),)).await?;
        Ok(titles.pop())
    }
}

#[async_trait]
impl CatalogBackend for CassandraBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cassandra
    }

    async fn insert_title(&self, title: &Title) -> Result<()> {
        title.validate()?;
        // CQL INSERT is an upsert; the duplicate check has to be explicit.
        if self.title_exists(&title.id).await? {
            return Err(Error::AlreadyExists(format!("title '{}'", title.id)));
        }
        let cql = format!(
            "INSERT INTO titles ({TITLE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.session
            .query_unpaged(
                cql,
                (
                    title.id.as_str(),
                    &title.name,
                    title.category.as_str(),
                    title.release_year,
                    &title.genres,
                    title.rating,
                    title.votes,
                    title.runtime_minutes,
                    &title.synopsis,
                ),
            )
            .await
            .map_err(Self::map_err)?;
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
        // Category equality is the only native predicate; it narrows the
        // scan through the secondary index. Everything else happens here.
        let mut candidates = if let Some(category) = &filter.category {
            let cql = format!(
                "SELECT {TITLE_COLUMNS} FROM titles WHERE category = ? LIMIT ?"
            );
            self.fetch_titles(cql, (category.as_str(), self.fetch_cap))
                .await?
        } else {
            let cql = format!("SELECT {TITLE_COLUMNS} FROM titles LIMIT ?");
            self.fetch_titles(cql, (self.fetch_cap,)).await?
        };
        tracing::debug!(
            target: "polystore::cassandra",
            candidates = candidates.len(),
            "scan bounded at {}",
            self.fetch_cap
        );

        candidates.retain(|title| query::title_matches(title, filter, self.policy));
        query::sort_and_truncate(&mut candidates, sort, limit);
        Ok(candidates)
    }

    async fn update_title_field(&self, id: &TitleId, update: &FieldUpdate) -> Result<()> {
        // CQL UPDATE upserts, so existence is checked first.
        if !self.title_exists(id).await? {
            return Err(Error::NotFound(format!("title '{id}'")));
        }
        let cql = format!("UPDATE titles SET {} = ? WHERE id = ?", update.field_name());
        let session = &self.session;
        match update {
            FieldUpdate::Name(v) => session.query_unpaged(cql, (v, id.as_str())).await,
            FieldUpdate::Category(v) => {
                session.query_unpaged(cql, (v.as_str(), id.as_str())).await
            },
            FieldUpdate::ReleaseYear(v) | FieldUpdate::RuntimeMinutes(v) => {
                session.query_unpaged(cql, (v, id.as_str())).await
            },
            FieldUpdate::Genres(v) => session.query_unpaged(cql, (v, id.as_str())).await,
            FieldUpdate::Rating(v) => session.query_unpaged(cql, (v, id.as_str())).await,
            FieldUpdate::Votes(v) => session.query_unpaged(cql, (v, id.as_str())).await,
            FieldUpdate::Synopsis(v) => session.query_unpaged(cql, (v, id.as_str())).await,
        }
        .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_title(&self, id: &TitleId) -> Result<()> {
        if !self.title_exists(id).await? {
            return Err(Error::NotFound(format!("title '{id}'")));
        }

        // Walk the reverse table to retract the per-person rows before the
        // partition and the title itself go away.
        let members = self
            .session
            .query_unpaged(
                "SELECT person_id FROM credits_by_title WHERE title_id = ?",
                (id.as_str(),),
            )
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        for row in members.rows::<(String,)>().map_err(Self::map_err)? {
            let (person_id,) = row.map_err(Self::map_err)?;
            self.session
                .query_unpaged(
                    "DELETE FROM credits_by_person WHERE person_id = ? AND title_id = ?",
                    (person_id, id.as_str()),
                )
                .await
                .map_err(Self::map_err)?;
        }
        self.session
            .query_unpaged(
                "DELETE FROM credits_by_title WHERE title_id = ?",
                (id.as_str(),),
            )
            .await
            .map_err(Self::map_err)?;
        self.session
            .query_unpaged("DELETE FROM titles WHERE id = ?", (id.as_str(),))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn insert_person(&self, person: &Person) -> Result<()> {
        person.validate()?;
        let existing = self
            .session
            .query_unpaged("SELECT id FROM people WHERE id = ?", (person.id.as_str(),))
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        if existing.rows_num() > 0 {
            return Err(Error::AlreadyExists(format!("person '{}'", person.id)));
        }
        self.session
            .query_unpaged(
                "INSERT INTO people (id, name, birth_year) VALUES (?, ?, ?)",
                (person.id.as_str(), &person.name, person.birth_year),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_person(&self, id: &PersonId) -> Result<Person> {
        let result = self
            .session
            .query_unpaged(
                "SELECT id, name, birth_year FROM people WHERE id = ?",
                (id.as_str(),),
            )
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;
        let row = result
            .maybe_first_row::<(String, Option<String>, Option<i32>)>()
            .map_err(Self::map_err)?
            .ok_or_else(|| Error::NotFound(format!("person '{id}'")))?;
        Ok(Person {
            id: PersonId::new(row.0),
            name: row.1.unwrap_or_default(),
            birth_year: row.2,
        })
    }

    async fn insert_credit(&self, credit: &Credit) -> Result<()> {
        credit.validate()?;
        // Both directions land in one logged batch; the clustering keys make
        // a repeated (person, title) pair overwrite its role.
        let mut batch = Batch::default();
        batch.append_statement(
            "INSERT INTO credits_by_person (person_id, title_id, role) VALUES (?, ?, ?)",
        );
        batch.append_statement(
            "INSERT INTO credits_by_title (title_id, person_id, role) VALUES (?, ?, ?)",
        );
        self.session
            .batch(
                &batch,
                (
                    (
                        credit.person_id.as_str(),
                        credit.title_id.as_str(),
                        &credit.role,
                    ),
                    (
                        credit.title_id.as_str(),
                        credit.person_id.as_str(),
                        &credit.role,
                    ),
                ),
            )
            .await
            .map_err(Self::map_err)?;
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

        let result = self
            .session
            .query_unpaged(
                "SELECT title_id FROM credits_by_person WHERE person_id = ?",
                (person_id.as_str(),),
            )
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;

        let mut titles = Vec::new();
        for row in result.rows::<(String,)>().map_err(Self::map_err)? {
            let (title_id,) = row.map_err(Self::map_err)?;
            if let Some(title) = self.get_title_opt(&TitleId::new(title_id)).await? {
                titles.push(title);
            }
        }
        query::sort_and_truncate(&mut titles, sort, limit);
        Ok(titles)
    }

    async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT person_id, role FROM credits_by_title WHERE title_id = ?",
                (id.as_str(),),
            )
            .await
            .map_err(Self::map_err)?
            .into_rows_result()
            .map_err(Self::map_err)?;

        let mut members = Vec::new();
        for row in result
            .rows::<(String, Option<String>)>()
            .map_err(Self::map_err)?
        {
            let (person_id, role) = row.map_err(Self::map_err)?;
            match self.get_person(&PersonId::new(person_id)).await {
                Ok(person) => members.push(CastMember {
                    person,
                    role: role.filter(|r| !r.is_empty()),
                }),
                Err(Error::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }
        members.sort_by(|a, b| a.person.id.cmp(&b.person.id));
        Ok(members)
    }

    async fn count_by_year(&self) -> Result<Vec<YearCount>> {
        let titles = self
            .fetch_titles(format!("SELECT {TITLE_COLUMNS} FROM titles"), ())
            .await?;
        Ok(query::count_by_year(&titles))
    }

    async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
        let titles = self
            .fetch_titles(format!("SELECT {TITLE_COLUMNS} FROM titles"), ())
            .await?;
        Ok(query::average_rating_by_genre(&titles))
    }

    async fn reset(&self) -> Result<()> {
        for table in ["titles", "people", "credits_by_person", "credits_by_title"] {
            self.session
                .query_unpaged(format!("TRUNCATE TABLE {table}"), ())
                .await
                .map_err(Self::map_err)?;
        }
        Ok(())
    }

    async fn load_titles(&self, titles: &[Title]) -> Result<usize> {
        let cql = format!(
            "INSERT INTO titles ({TITLE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let prepared = self.session.prepare(cql).await.map_err(Self::map_err)?;
        for title in titles {
            self.session
                .execute_unpaged(
                    &prepared,
                    (
                        title.id.as_str(),
                        &title.name,
                        title.category.as_str(),
                        title.release_year,
                        &title.genres,
                        title.rating,
                        title.votes,
                        title.runtime_minutes,
                        &title.synopsis,
                    ),
                )
                .await
                .map_err(Self::map_err)?;
        }
        Ok(titles.len())
    }

    async fn load_people(&self, people: &[Person]) -> Result<usize> {
        let prepared = self
            .session
            .prepare("INSERT INTO people (id, name, birth_year) VALUES (?, ?, ?)")
            .await
            .map_err(Self::map_err)?;
        for person in people {
            self.session
                .execute_unpaged(
                    &prepared,
                    (person.id.as_str(), &person.name, person.birth_year),
                )
                .await
                .map_err(Self::map_err)?;
        }
        Ok(people.len())
    }

    async fn load_credits(&self, credits: &[Credit]) -> Result<usize> {
        let forward = self
            .session
            .prepare("INSERT INTO credits_by_person (person_id, title_id, role) VALUES (?, ?, ?)")
            .await
            .map_err(Self::map_err)?;
        let reverse = self
            .session
            .prepare("INSERT INTO credits_by_title (title_id, person_id, role) VALUES (?, ?, ?)")
            .await
            .map_err(Self::map_err)?;
        for credit in credits {
            self.session
                .execute_unpaged(
                    &forward,
                    (
                        credit.person_id.as_str(),
                        credit.title_id.as_str(),
                        &credit.role,
                    ),
                )
                .await
                .map_err(Self::map_err)?;
            self.session
                .execute_unpaged(
                    &reverse,
                    (
                        credit.title_id.as_str(),
                        credit.person_id.as_str(),
                        &credit.role,
                    ),
                )
                .await
                .map_err(Self::map_err)?;
        }
        Ok(credits.len())
    }
}
