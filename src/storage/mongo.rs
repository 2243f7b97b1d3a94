//! MongoDB document-store adapter.
//!
//! The one engine where every canonical filter field is native-pushable:
//! searches compile to a single compound query, the future-release exception
//! included (a three-arm `$or` distinguishing evaluated back-catalog titles,
//! evaluated future titles, and unevaluated future titles). Relationship
//! traversal uses an aggregation `$lookup` over the credits collection.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};

use crate::config::MongoConfig;
use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, SortDirection, Title,
    TitleFilter, TitleId, YearCount,
};
use crate::query::SearchPolicy;
use crate::storage::{BackendKind, CatalogBackend};
use crate::{Error, Result};

const TITLES: &str = "titles";
const PEOPLE: &str = "people";
const CREDITS: &str = "credits";

/// MongoDB server error code for a duplicate key.
const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed catalog adapter.
///
/// Owns one `Client` (internally pooled) constructed at startup; typed
/// collection handles are cheap clones of it.
pub struct MongoBackend {
    db: mongodb::Database,
    titles: Collection<Title>,
    people: Collection<Person>,
    credits: Collection<Credit>,
    policy: SearchPolicy,
}

impl MongoBackend {
    /// Connects and verifies the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the URI is invalid or the server
    /// does not answer a ping.
    pub async fn connect(config: &MongoConfig, policy: SearchPolicy) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| Error::unavailable("mongo", e))?;
        let db = client.database(&config.database);
        db.run_command(doc! {"ping": 1})
            .await
            .map_err(|e| Error::unavailable("mongo", e))?;

        Ok(Self {
            titles: db.collection(TITLES),
            people: db.collection(PEOPLE),
            credits: db.collection(CREDITS),
            db,
            policy,
        })
    }

    /// Maps a driver error, recognizing duplicate-key writes.
    fn map_err(entity: &str, e: &mongodb::error::Error) -> Error {
        use mongodb::error::{ErrorKind, WriteFailure};
        if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = &*e.kind {
            if write_error.code == DUPLICATE_KEY {
                return Error::AlreadyExists(entity.to_string());
            }
        }
        Error::unavailable("mongo", e)
    }

    /// Builds the compound search query, future-release exception included.
    fn build_query(&self, filter: &TitleFilter) -> Document {
        let cutoff = self.policy.future_cutoff_year;
        let mut clauses: Vec<Document> = Vec::new();

        if let Some(fragment) = &filter.name_contains {
            clauses.push(doc! {
                "name": { "$regex": regex_escape(fragment), "$options": "i" }
            });
        }
        if let Some(category) = &filter.category {
            clauses.push(doc! { "category": category.as_str() });
        }
        if let Some(year_min) = filter.year_min {
            clauses.push(doc! { "release_year": { "$gte": year_min } });
        }
        if !filter.genres_all.is_empty() {
            clauses.push(doc! { "genres": { "$all": &filter.genres_all } });
        }

        if filter.has_evaluation_bounds() {
            let mut evaluation: Vec<Document> = Vec::new();
            if let Some(rating_min) = filter.rating_min {
                evaluation.push(doc! { "rating": { "$gte": rating_min } });
            }
            if let Some(runtime_min) = filter.runtime_min {
                // Runtime is meaningless for games; they pass this bound.
                evaluation.push(doc! {
                    "$or": [
                        { "category": "game" },
                        { "runtime_minutes": { "$gte": runtime_min } },
                    ]
                });
            }

            // Back-catalog titles (year below the cutoff or unknown) and
            // future titles that already carry an evaluation face the bounds;
            // unevaluated future titles bypass them.
            let back_catalog = doc! {
                "release_year": { "$not": { "$gte": cutoff } },
                "$and": evaluation.clone(),
            };
            let evaluated_future = doc! {
                "release_year": { "$gte": cutoff },
                "$or": [
                    { "rating": { "$gt": 0 } },
                    { "votes": { "$gt": 0 } },
                ],
                "$and": evaluation,
            };
            let unevaluated_future = doc! {
                "release_year": { "$gte": cutoff },
                "rating": { "$in": [Bson::Int32(0), Bson::Null] },
                "votes": { "$in": [Bson::Int32(0), Bson::Null] },
            };
            clauses.push(doc! { "$or": [back_catalog, evaluated_future, unevaluated_future] });
        }

        if clauses.is_empty() {
            doc! {}
        } else {
            doc! { "$and": clauses }
        }
    }

    async fn resolve_person_id(&self, person_ref: &str) -> Result<Option<PersonId>> {
        let by_id = self
            .people
            .find_one(doc! { "_id": person_ref })
            .await
            .map_err(|e| Self::map_err("person", &e))?;
        if let Some(person) = by_id {
            return Ok(Some(person.id));
        }
        let by_name = self
            .people
            .find_one(doc! { "name": person_ref })
            .await
            .map_err(|e| Self::map_err("person", &e))?;
        Ok(by_name.map(|p| p.id))
    }
}

/// Sort document with the shared id tiebreak appended.
fn sort_doc(sort: Sort) -> Document {
    let direction = match sort.direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    };
    doc! { sort.field.as_str(): direction, "_id": 1 }
}

/// Escapes a fragment for literal use inside `$regex`.
fn regex_escape(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if r"\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Extracts a numeric BSON value as i64, tolerating int32/int64/double.
fn bson_as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

#[async_trait]
impl CatalogBackend for MongoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
    }

    async fn insert_title(&self, title: &Title) -> Result<()> {
        title.validate()?;
        self.titles
            .insert_one(title)
            .await
            .map_err(|e| Self::map_err(&format!("title '{}'", title.id), &e))?;
        Ok(())
    }

    async fn get_title(&self, id: &TitleId) -> Result<Title> {
        self.titles
            .find_one(doc! { "_id": id.as_str() })
            .await
            .map_err(|e| Self::map_err("title", &e))?
            .ok_or_else(|| Error::NotFound(format!("title '{id}'")))
    }

    async fn search_titles(
        &self,
        filter: &TitleFilter,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>> {
        let query = self.build_query(filter);
        tracing::debug!(target: "polystore::mongo", ?query, "advanced search");

        let mut cursor = self
            .titles
            .find(query)
            .sort(sort_doc(sort))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|e| Self::map_err("titles", &e))?;

        let mut results = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| Self::map_err("titles", &e))?
        {
            results.push(
                cursor
                    .deserialize_current()
                    .map_err(|e| Self::map_err("titles", &e))?,
            );
        }
        Ok(results)
    }

    async fn update_title_field(&self, id: &TitleId, update: &FieldUpdate) -> Result<()> {
        let value: Bson = match update {
            FieldUpdate::Name(name) => Bson::String(name.clone()),
            FieldUpdate::Category(category) => Bson::String(category.as_str().to_string()),
            FieldUpdate::ReleaseYear(year) => year.map_or(Bson::Null, Bson::Int32),
            FieldUpdate::Genres(genres) => {
                Bson::Array(genres.iter().cloned().map(Bson::String).collect())
            },
            FieldUpdate::Rating(rating) => rating.map_or(Bson::Null, Bson::Double),
            FieldUpdate::Votes(votes) => votes.map_or(Bson::Null, Bson::Int64),
            FieldUpdate::RuntimeMinutes(minutes) => minutes.map_or(Bson::Null, Bson::Int32),
            FieldUpdate::Synopsis(synopsis) => {
                synopsis.clone().map_or(Bson::Null, Bson::String)
            },
        };

        let result = self
            .titles
            .update_one(
                doc! { "_id": id.as_str() },
                doc! { "$set": { update.field_name(): value } },
            )
            .await
            .map_err(|e| Self::map_err("title", &e))?;
        if result.matched_count == 0 {
            return Err(Error::NotFound(format!("title '{id}'")));
        }
        Ok(())
    }

    async fn delete_title(&self, id: &TitleId) -> Result<()> {
        let result = self
            .titles
            .delete_one(doc! { "_id": id.as_str() })
            .await
            .map_err(|e| Self::map_err("title", &e))?;
        if result.deleted_count == 0 {
            return Err(Error::NotFound(format!("title '{id}'")));
        }
        // Credits are first-class documents here; the cascade is one delete.
        self.credits
            .delete_many(doc! { "title_id": id.as_str() })
            .await
            .map_err(|e| Self::map_err("credits", &e))?;
        Ok(())
    }

    async fn insert_person(&self, person: &Person) -> Result<()> {
        person.validate()?;
        self.people
            .insert_one(person)
            .await
            .map_err(|e| Self::map_err(&format!("person '{}'", person.id), &e))?;
        Ok(())
    }

    async fn get_person(&self, id: &PersonId) -> Result<Person> {
        self.people
            .find_one(doc! { "_id": id.as_str() })
            .await
            .map_err(|e| Self::map_err("person", &e))?
            .ok_or_else(|| Error::NotFound(format!("person '{id}'")))
    }

    async fn insert_credit(&self, credit: &Credit) -> Result<()> {
        credit.validate()?;
        self.credits
            .update_one(
                doc! {
                    "person_id": credit.person_id.as_str(),
                    "title_id": credit.title_id.as_str(),
                },
                doc! { "$set": { "role": &credit.role } },
            )
            .upsert(true)
            .await
            .map_err(|e| Self::map_err("credit", &e))?;
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

        // Join credits to titles, de-duplicate on the title id, then order.
        let pipeline = vec![
            doc! { "$match": { "person_id": person_id.as_str() } },
            doc! { "$lookup": {
                "from": TITLES,
                "localField": "title_id",
                "foreignField": "_id",
                "as": "title",
            }},
            doc! { "$unwind": "$title" },
            doc! { "$group": { "_id": "$title._id", "title": { "$first": "$title" } } },
            doc! { "$replaceRoot": { "newRoot": "$title" } },
            doc! { "$sort": sort_doc(sort) },
            doc! { "$limit": i64::try_from(limit).unwrap_or(i64::MAX) },
        ];

        let mut cursor = self
            .credits
            .aggregate(pipeline)
            .await
            .map_err(|e| Self::map_err("credits", &e))?;
        let mut titles = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| Self::map_err("credits", &e))?
        {
            let document = cursor
                .deserialize_current()
                .map_err(|e| Self::map_err("credits", &e))?;
            let title: Title = mongodb::bson::from_document(document)
                .map_err(|e| Error::unavailable("mongo", e))?;
            titles.push(title);
        }
        Ok(titles)
    }

    async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>> {
        let mut roles: Vec<(PersonId, String)> = Vec::new();
        let mut cursor = self
            .credits
            .find(doc! { "title_id": id.as_str() })
            .await
            .map_err(|e| Self::map_err("credits", &e))?;
        while cursor
            .advance()
            .await
            .map_err(|e| Self::map_err("credits", &e))?
        {
            let credit: Credit = cursor
                .deserialize_current()
                .map_err(|e| Self::map_err("credits", &e))?;
            roles.push((credit.person_id, credit.role));
        }
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = roles.iter().map(|(pid, _)| pid.as_str()).collect();
        let mut people = std::collections::BTreeMap::new();
        let mut cursor = self
            .people
            .find(doc! { "_id": { "$in": ids } })
            .await
            .map_err(|e| Self::map_err("people", &e))?;
        while cursor
            .advance()
            .await
            .map_err(|e| Self::map_err("people", &e))?
        {
            let person: Person = cursor
                .deserialize_current()
                .map_err(|e| Self::map_err("people", &e))?;
            people.insert(person.id.clone(), person);
        }

        roles.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(roles
            .into_iter()
            .filter_map(|(pid, role)| {
                people.get(&pid).map(|person| CastMember {
                    person: person.clone(),
                    role: Some(role).filter(|r| !r.is_empty()),
                })
            })
            .collect())
    }

    async fn count_by_year(&self) -> Result<Vec<YearCount>> {
        let pipeline = vec![
            doc! { "$match": { "release_year": { "$ne": Bson::Null } } },
            doc! { "$group": { "_id": "$release_year", "count": { "$sum": 1 } } },
            doc! { "$sort": { "_id": 1 } },
        ];
        let mut cursor = self
            .titles
            .aggregate(pipeline)
            .await
            .map_err(|e| Self::map_err("titles", &e))?;
        let mut counts = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| Self::map_err("titles", &e))?
        {
            let document = cursor
                .deserialize_current()
                .map_err(|e| Self::map_err("titles", &e))?;
            let year = document.get("_id").and_then(bson_as_i64);
            let count = document.get("count").and_then(bson_as_i64);
            if let (Some(year), Some(count)) = (year, count) {
                counts.push(YearCount {
                    year: i32::try_from(year).unwrap_or_default(),
                    count: u64::try_from(count).unwrap_or_default(),
                });
            }
        }
        Ok(counts)
    }

    async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
        let pipeline = vec![
            doc! { "$match": {
                "genres": { "$ne": Bson::Null, "$not": { "$size": 0 } },
                "rating": { "$ne": Bson::Null },
            }},
            doc! { "$unwind": "$genres" },
            doc! { "$group": {
                "_id": "$genres",
                "sum": { "$sum": "$rating" },
                "count": { "$sum": 1 },
            }},
            doc! { "$project": {
                "genre": "$_id",
                "average": { "$round": [{ "$divide": ["$sum", "$count"] }, 2] },
                "_id": 0,
            }},
            doc! { "$sort": { "average": -1, "genre": 1 } },
        ];
        let mut cursor = self
            .titles
            .aggregate(pipeline)
            .await
            .map_err(|e| Self::map_err("titles", &e))?;
        let mut averages = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| Self::map_err("titles", &e))?
        {
            let document = cursor
                .deserialize_current()
                .map_err(|e| Self::map_err("titles", &e))?;
            let genre = document.get_str("genre").unwrap_or_default().to_string();
            let average = document
                .get("average")
                .and_then(Bson::as_f64)
                .or_else(|| document.get("average").and_then(bson_as_i64).map(|v| v as f64));
            if let Some(average) = average {
                averages.push(GenreAverage { genre, average });
            }
        }
        Ok(averages)
    }

    async fn reset(&self) -> Result<()> {
        for name in [TITLES, PEOPLE, CREDITS] {
            self.db
                .collection::<Document>(name)
                .delete_many(doc! {})
                .await
                .map_err(|e| Self::map_err(name, &e))?;
        }

        // One pair per (person, title): the unique index is what turns
        // repeated credit inserts into role overwrites at load time too.
        let unique_pair = IndexModel::builder()
            .keys(doc! { "person_id": 1, "title_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.credits
            .create_index(unique_pair)
            .await
            .map_err(|e| Self::map_err("credits", &e))?;

        for field in ["name", "release_year", "rating", "votes", "runtime_minutes"] {
            let index = IndexModel::builder().keys(doc! { field: 1 }).build();
            self.titles
                .create_index(index)
                .await
                .map_err(|e| Self::map_err("titles", &e))?;
        }
        let person_name = IndexModel::builder().keys(doc! { "name": 1 }).build();
        self.people
            .create_index(person_name)
            .await
            .map_err(|e| Self::map_err("people", &e))?;
        Ok(())
    }

    async fn load_titles(&self, titles: &[Title]) -> Result<usize> {
        if titles.is_empty() {
            return Ok(0);
        }
        let result = self
            .titles
            .insert_many(titles)
            .ordered(false)
            .await
            .map_err(|e| Self::map_err("titles", &e))?;
        Ok(result.inserted_ids.len())
    }

    async fn load_people(&self, people: &[Person]) -> Result<usize> {
        if people.is_empty() {
            return Ok(0);
        }
        let result = self
            .people
            .insert_many(people)
            .ordered(false)
            .await
            .map_err(|e| Self::map_err("people", &e))?;
        Ok(result.inserted_ids.len())
    }

    async fn load_credits(&self, credits: &[Credit]) -> Result<usize> {
        if credits.is_empty() {
            return Ok(0);
        }
        let result = self
            .credits
            .insert_many(credits)
            .ordered(false)
            .await
            .map_err(|e| Self::map_err("credits", &e))?;
        Ok(result.inserted_ids.len())
    }
}
