//! Neo4j graph-store adapter.
//!
//! Titles and people are nodes, credits are `APPEARED_IN` edges carrying the
//! role label, so relationship traversal and cascade-on-delete are native
//! (`DETACH DELETE`). Search compiles to one traversal predicate (list
//! containment, range bounds, and the future-release `OR` block) with no
//! in-process post-filtering.

use std::collections::HashMap;

use async_trait::async_trait;
use neo4rs::{query, BoltType, Graph, Node, Query};

use crate::config::Neo4jConfig;
use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, SortDirection, Title,
    TitleCategory, TitleFilter, TitleId, YearCount,
};
use crate::query::SearchPolicy;
use crate::storage::{BackendKind, CatalogBackend};
use crate::{Error, Result};

/// Uniqueness constraints (which imply lookup indexes) created at connect.
const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT title_id IF NOT EXISTS FOR (t:Title) REQUIRE t.id IS UNIQUE",
    "CREATE CONSTRAINT person_id IF NOT EXISTS FOR (p:Person) REQUIRE p.id IS UNIQUE",
    "CREATE INDEX title_name IF NOT EXISTS FOR (t:Title) ON (t.name)",
    "CREATE INDEX person_name IF NOT EXISTS FOR (p:Person) ON (p.name)",
];

/// Batch size for `UNWIND` bulk loads.
const LOAD_BATCH: usize = 1000;

/// Neo4j-backed catalog adapter.
pub struct Neo4jBackend {
    graph: Graph,
    policy: SearchPolicy,
}

impl Neo4jBackend {
    /// Connects, verifies reachability, and ensures constraints exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the server is unreachable or
    /// authentication fails.
    pub async fn connect(config: &Neo4jConfig, policy: SearchPolicy) -> Result<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| Error::unavailable("neo4j", e))?;
        for statement in CONSTRAINTS {
            graph
                .run(query(statement))
                .await
                .map_err(|e| Error::unavailable("neo4j", e))?;
        }
        Ok(Self { graph, policy })
    }

    fn map_err(e: impl std::fmt::Display) -> Error {
        Error::unavailable("neo4j", e)
    }

    fn node_to_title(node: &Node) -> Result<Title> {
        Ok(Title {
            id: TitleId::new(node.get::<String>("id").map_err(Self::map_err)?),
            name: node.get::<String>("name").unwrap_or_default(),
            category: TitleCategory::parse(
                &node.get::<String>("category").unwrap_or_default(),
            ),
            release_year: node
                .get::<i64>("release_year")
                .ok()
                .and_then(|y| i32::try_from(y).ok()),
            genres: node.get::<Vec<String>>("genres").unwrap_or_default(),
            rating: node.get::<f64>("rating").ok(),
            votes: node.get::<i64>("votes").ok(),
            runtime_minutes: node
                .get::<i64>("runtime_minutes")
                .ok()
                .and_then(|m| i32::try_from(m).ok()),
            synopsis: node.get::<String>("synopsis").ok(),
        })
    }

    fn node_to_person(node: &Node) -> Result<Person> {
        Ok(Person {
            id: PersonId::new(node.get::<String>("id").map_err(Self::map_err)?),
            name: node.get::<String>("name").unwrap_or_default(),
            birth_year: node
                .get::<i64>("birth_year")
                .ok()
                .and_then(|y| i32::try_from(y).ok()),
        })
    }

    /// Maps a title to the property bag used by parameterized writes.
    ///
    /// Absent optionals are simply omitted: a missing map key reads as null
    /// in Cypher, which leaves the property unset.
    fn title_props(title: &Title) -> HashMap<String, BoltType> {
        let mut props: HashMap<String, BoltType> = HashMap::new();
        props.insert("id".into(), title.id.as_str().into());
        props.insert("name".into(), title.name.clone().into());
        props.insert("category".into(), title.category.as_str().into());
        props.insert("genres".into(), title.genres.clone().into());
        if let Some(year) = title.release_year {
            props.insert("release_year".into(), i64::from(year).into());
        }
        if let Some(rating) = title.rating {
            props.insert("rating".into(), rating.into());
        }
        if let Some(votes) = title.votes {
            props.insert("votes".into(), votes.into());
        }
        if let Some(minutes) = title.runtime_minutes {
            props.insert("runtime_minutes".into(), i64::from(minutes).into());
        }
        if let Some(synopsis) = &title.synopsis {
            props.insert("synopsis".into(), synopsis.clone().into());
        }
        props
    }

    fn person_props(person: &Person) -> HashMap<String, BoltType> {
        let mut props: HashMap<String, BoltType> = HashMap::new();
        props.insert("id".into(), person.id.as_str().into());
        props.insert("name".into(), person.name.clone().into());
        if let Some(year) = person.birth_year {
            props.insert("birth_year".into(), i64::from(year).into());
        }
        props
    }

    async fn title_exists(&self, id: &TitleId) -> Result<bool> {
        let mut stream = self
            .graph
            .execute(
                query("MATCH (t:Title {id: $id}) RETURN count(t) AS n").param("id", id.as_str()),
            )
            .await
            .map_err(Self::map_err)?;
        let row = stream.next().await.map_err(Self::map_err)?;
        Ok(row
            .and_then(|r| r.get::<i64>("n").ok())
            .is_some_and(|n| n > 0))
    }

    async fn resolve_person_id(&self, person_ref: &str) -> Result<Option<PersonId>> {
        let by_id = query("MATCH (p:Person {id: $ref}) RETURN p.id AS id LIMIT 1")
            .param("ref", person_ref);
        let mut stream = self.graph.execute(by_id).await.map_err(Self::map_err)?;
        if let Some(row) = stream.next().await.map_err(Self::map_err)? {
            return Ok(row.get::<String>("id").ok().map(PersonId::new));
        }

        let by_name = query("MATCH (p:Person {name: $ref}) RETURN p.id AS id LIMIT 1")
            .param("ref", person_ref);
        let mut stream = self.graph.execute(by_name).await.map_err(Self::map_err)?;
        if let Some(row) = stream.next().await.map_err(Self::map_err)? {
            return Ok(row.get::<String>("id").ok().map(PersonId::new));
        }
        Ok(None)
    }

    /// Builds the single traversal predicate for a search.
    fn build_search(&self, filter: &TitleFilter, sort: Sort, limit: usize) -> Query {
        let mut conditions: Vec<String> = Vec::new();
        let mut q_params: Vec<(&str, BoltType)> = Vec::new();

        if let Some(fragment) = &filter.name_contains {
            conditions.push("toLower(t.name) CONTAINS toLower($fragment)".to_string());
            q_params.push(("fragment", fragment.clone().into()));
        }
        if let Some(category) = &filter.category {
            conditions.push("t.category = $category".to_string());
            q_params.push(("category", category.as_str().into()));
        }
        if let Some(year_min) = filter.year_min {
            conditions.push("t.release_year >= $year_min".to_string());
            q_params.push(("year_min", i64::from(year_min).into()));
        }
        if !filter.genres_all.is_empty() {
            conditions.push("ALL(g IN $genres WHERE g IN t.genres)".to_string());
            q_params.push(("genres", filter.genres_all.clone().into()));
        }

        if filter.has_evaluation_bounds() {
            let mut bounds: Vec<String> = Vec::new();
            if let Some(rating_min) = filter.rating_min {
                bounds.push("t.rating >= $rating_min".to_string());
                q_params.push(("rating_min", rating_min.into()));
            }
            if let Some(runtime_min) = filter.runtime_min {
                bounds.push(
                    "(t.category = 'game' OR t.runtime_minutes >= $runtime_min)".to_string(),
                );
                q_params.push(("runtime_min", i64::from(runtime_min).into()));
            }
            q_params.push(("cutoff", i64::from(self.policy.future_cutoff_year).into()));

            let evaluated = format!(
                "((t.release_year IS NULL OR t.release_year < $cutoff) OR \
                  (t.release_year >= $cutoff AND (t.rating > 0 OR t.votes > 0))) \
                 AND ({})",
                bounds.join(" AND ")
            );
            let unevaluated_future = "(t.release_year >= $cutoff AND \
                 (t.rating IS NULL OR t.rating = 0) AND \
                 (t.votes IS NULL OR t.votes = 0))";
            conditions.push(format!("(({evaluated}) OR ({unevaluated_future}))"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {} ", conditions.join(" AND "))
        };
        let direction = match sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let cypher = format!(
            "MATCH (t:Title) {where_clause}RETURN t \
             ORDER BY t.{field} {direction}, t.id ASC LIMIT $limit",
            field = sort.field.as_str(),
        );

        let mut q = query(&cypher).param("limit", i64::try_from(limit).unwrap_or(i64::MAX));
        for (name, value) in q_params {
            q = q.param(name, value);
        }
        q
    }
}

#[async_trait]
impl CatalogBackend for Neo4jBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Neo4j
    }

    async fn insert_title(&self, title: &Title) -> Result<()> {
        title.validate()?;
        if self.title_exists(&title.id).await? {
            return Err(Error::AlreadyExists(format!("title '{}'", title.id)));
        }
        self.graph
            .run(query("CREATE (t:Title) SET t = $props").param("props", Self::title_props(title)))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_title(&self, id: &TitleId) -> Result<Title> {
        let mut stream = self
            .graph
            .execute(query("MATCH (t:Title {id: $id}) RETURN t").param("id", id.as_str()))
            .await
            .map_err(Self::map_err)?;
        let Some(row) = stream.next().await.map_err(Self::map_err)? else {
            return Err(Error::NotFound(format!("title '{id}'")));
        };
        let node: Node = row.get("t").map_err(Self::map_err)?;
        Self::node_to_title(&node)
    }

    async fn search_titles(
        &self,
        filter: &TitleFilter,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>> {
        let q = self.build_search(filter, sort, limit);
        let mut stream = self.graph.execute(q).await.map_err(Self::map_err)?;
        let mut titles = Vec::new();
        while let Some(row) = stream.next().await.map_err(Self::map_err)? {
            let node: Node = row.get("t").map_err(Self::map_err)?;
            titles.push(Self::node_to_title(&node)?);
        }
        Ok(titles)
    }

    async fn update_title_field(&self, id: &TitleId, update: &FieldUpdate) -> Result<()> {
        if !self.title_exists(id).await? {
            return Err(Error::NotFound(format!("title '{id}'")));
        }
        let field = update.field_name();

        // A null value is written as the Cypher literal, which removes the
        // property; present values travel as parameters.
        let value: Option<BoltType> = match update {
            FieldUpdate::Name(v) => Some(v.clone().into()),
            FieldUpdate::Category(v) => Some(v.as_str().into()),
            FieldUpdate::ReleaseYear(v) | FieldUpdate::RuntimeMinutes(v) => {
                v.map(|x| BoltType::from(i64::from(x)))
            },
            FieldUpdate::Genres(v) => Some(v.clone().into()),
            FieldUpdate::Rating(v) => v.map(BoltType::from),
            FieldUpdate::Votes(v) => v.map(BoltType::from),
            FieldUpdate::Synopsis(v) => v.clone().map(BoltType::from),
        };

        let q = match value {
            Some(value) => query(&format!(
                "MATCH (t:Title {{id: $id}}) SET t.{field} = $value"
            ))
            .param("id", id.as_str())
            .param("value", value),
            None => query(&format!("MATCH (t:Title {{id: $id}}) SET t.{field} = null"))
                .param("id", id.as_str()),
        };
        self.graph.run(q).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_title(&self, id: &TitleId) -> Result<()> {
        if !self.title_exists(id).await? {
            return Err(Error::NotFound(format!("title '{id}'")));
        }
        // Edges go with the node; this is the whole cascade here.
        self.graph
            .run(query("MATCH (t:Title {id: $id}) DETACH DELETE t").param("id", id.as_str()))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn insert_person(&self, person: &Person) -> Result<()> {
        person.validate()?;
        let mut stream = self
            .graph
            .execute(
                query("MATCH (p:Person {id: $id}) RETURN count(p) AS n")
                    .param("id", person.id.as_str()),
            )
            .await
            .map_err(Self::map_err)?;
        let exists = stream
            .next()
            .await
            .map_err(Self::map_err)?
            .and_then(|r| r.get::<i64>("n").ok())
            .is_some_and(|n| n > 0);
        if exists {
            return Err(Error::AlreadyExists(format!("person '{}'", person.id)));
        }
        self.graph
            .run(
                query("CREATE (p:Person) SET p = $props")
                    .param("props", Self::person_props(person)),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_person(&self, id: &PersonId) -> Result<Person> {
        let mut stream = self
            .graph
            .execute(query("MATCH (p:Person {id: $id}) RETURN p").param("id", id.as_str()))
            .await
            .map_err(Self::map_err)?;
        let Some(row) = stream.next().await.map_err(Self::map_err)? else {
            return Err(Error::NotFound(format!("person '{id}'")));
        };
        let node: Node = row.get("p").map_err(Self::map_err)?;
        Self::node_to_person(&node)
    }

    async fn insert_credit(&self, credit: &Credit) -> Result<()> {
        credit.validate()?;
        // MERGE keeps the (person, title) pair unique; SET overwrites the
        // role on re-insertion.
        self.graph
            .run(
                query(
                    "MATCH (p:Person {id: $person_id}) \
                     MATCH (t:Title {id: $title_id}) \
                     MERGE (p)-[r:APPEARED_IN]->(t) \
                     SET r.role = $role",
                )
                .param("person_id", credit.person_id.as_str())
                .param("title_id", credit.title_id.as_str())
                .param("role", credit.role.as_str()),
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
        let direction = match sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let cypher = format!(
            "MATCH (p:Person {{id: $id}})-[:APPEARED_IN]->(t:Title) \
             RETURN DISTINCT t ORDER BY t.{field} {direction}, t.id ASC LIMIT $limit",
            field = sort.field.as_str(),
        );
        let q = query(&cypher)
            .param("id", person_id.as_str())
            .param("limit", i64::try_from(limit).unwrap_or(i64::MAX));

        let mut stream = self.graph.execute(q).await.map_err(Self::map_err)?;
        let mut titles = Vec::new();
        while let Some(row) = stream.next().await.map_err(Self::map_err)? {
            let node: Node = row.get("t").map_err(Self::map_err)?;
            titles.push(Self::node_to_title(&node)?);
        }
        Ok(titles)
    }

    async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>> {
        let q = query(
            "MATCH (t:Title {id: $id})<-[r:APPEARED_IN]-(p:Person) \
             RETURN p, r.role AS role ORDER BY p.id ASC",
        )
        .param("id", id.as_str());

        let mut stream = self.graph.execute(q).await.map_err(Self::map_err)?;
        let mut members = Vec::new();
        while let Some(row) = stream.next().await.map_err(Self::map_err)? {
            let node: Node = row.get("p").map_err(Self::map_err)?;
            members.push(CastMember {
                person: Self::node_to_person(&node)?,
                role: row.get::<String>("role").ok().filter(|r| !r.is_empty()),
            });
        }
        Ok(members)
    }

    async fn count_by_year(&self) -> Result<Vec<YearCount>> {
        let q = query(
            "MATCH (t:Title) WHERE t.release_year IS NOT NULL \
             RETURN t.release_year AS year, count(t) AS count ORDER BY year ASC",
        );
        let mut stream = self.graph.execute(q).await.map_err(Self::map_err)?;
        let mut counts = Vec::new();
        while let Some(row) = stream.next().await.map_err(Self::map_err)? {
            let year = row.get::<i64>("year").map_err(Self::map_err)?;
            let count = row.get::<i64>("count").map_err(Self::map_err)?;
            counts.push(YearCount {
                year: i32::try_from(year).unwrap_or_default(),
                count: u64::try_from(count).unwrap_or_default(),
            });
        }
        Ok(counts)
    }

    async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
        let q = query(
            "MATCH (t:Title) \
             WHERE t.rating IS NOT NULL AND t.genres IS NOT NULL AND size(t.genres) > 0 \
             UNWIND t.genres AS genre \
             WITH genre, avg(t.rating) AS average \
             RETURN genre, round(average * 100) / 100.0 AS average \
             ORDER BY average DESC, genre ASC",
        );
        let mut stream = self.graph.execute(q).await.map_err(Self::map_err)?;
        let mut averages = Vec::new();
        while let Some(row) = stream.next().await.map_err(Self::map_err)? {
            averages.push(GenreAverage {
                genre: row.get::<String>("genre").map_err(Self::map_err)?,
                average: row.get::<f64>("average").map_err(Self::map_err)?,
            });
        }
        Ok(averages)
    }

    async fn reset(&self) -> Result<()> {
        self.graph
            .run(query("MATCH (n) DETACH DELETE n"))
            .await
            .map_err(Self::map_err)
    }

    async fn load_titles(&self, titles: &[Title]) -> Result<usize> {
        let cypher = "UNWIND $batch AS props \
                      MERGE (t:Title {id: props.id}) SET t = props";
        let mut loaded = 0;
        for chunk in titles.chunks(LOAD_BATCH) {
            let batch: Vec<BoltType> = chunk
                .iter()
                .map(|t| BoltType::from(Self::title_props(t)))
                .collect();
            self.graph
                .run(query(cypher).param("batch", batch))
                .await
                .map_err(Self::map_err)?;
            loaded += chunk.len();
        }
        Ok(loaded)
    }

    async fn load_people(&self, people: &[Person]) -> Result<usize> {
        let cypher = "UNWIND $batch AS props \
                      MERGE (p:Person {id: props.id}) SET p = props";
        let mut loaded = 0;
        for chunk in people.chunks(LOAD_BATCH) {
            let batch: Vec<BoltType> = chunk
                .iter()
                .map(|p| BoltType::from(Self::person_props(p)))
                .collect();
            self.graph
                .run(query(cypher).param("batch", batch))
                .await
                .map_err(Self::map_err)?;
            loaded += chunk.len();
        }
        Ok(loaded)
    }

    async fn load_credits(&self, credits: &[Credit]) -> Result<usize> {
        let cypher = "UNWIND $batch AS row \
                      MATCH (p:Person {id: row.person_id}) \
                      MATCH (t:Title {id: row.title_id}) \
                      MERGE (p)-[r:APPEARED_IN]->(t) \
                      SET r.role = row.role";
        let mut loaded = 0;
        for chunk in credits.chunks(LOAD_BATCH) {
            let batch: Vec<BoltType> = chunk
                .iter()
                .map(|c| {
                    let mut row: HashMap<String, BoltType> = HashMap::new();
                    row.insert("person_id".into(), c.person_id.as_str().into());
                    row.insert("title_id".into(), c.title_id.as_str().into());
                    row.insert("role".into(), c.role.clone().into());
                    BoltType::from(row)
                })
                .collect();
            self.graph
                .run(query(cypher).param("batch", batch))
                .await
                .map_err(Self::map_err)?;
            loaded += chunk.len();
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_props_omits_absent_optionals() {
        let title = Title {
            id: TitleId::new("tt1"),
            name: "Example".to_string(),
            category: TitleCategory::Movie,
            release_year: None,
            genres: vec!["Drama".to_string()],
            rating: Some(7.5),
            votes: None,
            runtime_minutes: None,
            synopsis: None,
        };
        let props = Neo4jBackend::title_props(&title);
        assert!(props.contains_key("id"));
        assert!(props.contains_key("rating"));
        // Absent optionals stay out of the bag so Cypher reads them as null.
        assert!(!props.contains_key("release_year"));
        assert!(!props.contains_key("synopsis"));
    }
}
