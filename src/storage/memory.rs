//! In-memory reference backend.
//!
//! Implements the full contract against plain maps. It exists for two
//! reasons: orchestrator and loader tests run against it without any engine
//! available, and it documents the expected semantics of every operation in
//! the simplest possible form. The shared matcher and comparator in
//! [`crate::query`] do all the evaluation, so this backend is also the
//! oracle the engine adapters are tested against.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, Title, TitleFilter,
    TitleId, YearCount,
};
use crate::query::{self, SearchPolicy};
use crate::storage::{BackendKind, CatalogBackend};
use crate::{Error, Result};

#[derive(Default)]
struct State {
    titles: BTreeMap<TitleId, Title>,
    people: BTreeMap<PersonId, Person>,
    /// Role per (person, title) pair; the map key enforces the at-most-one
    /// invariant structurally.
    credits: BTreeMap<(PersonId, TitleId), String>,
}

/// In-memory backend over process-local maps.
pub struct MemoryBackend {
    state: RwLock<State>,
    policy: SearchPolicy,
}

impl MemoryBackend {
    /// Creates an empty backend with the given search policy.
    #[must_use]
    pub fn new(policy: SearchPolicy) -> Self {
        Self {
            state: RwLock::new(State::default()),
            policy,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| Error::unavailable("memory", format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| Error::unavailable("memory", format!("lock poisoned: {e}")))
    }

    fn resolve_person(state: &State, person_ref: &str) -> Option<PersonId> {
        let by_id = PersonId::new(person_ref);
        if state.people.contains_key(&by_id) {
            return Some(by_id);
        }
        state
            .people
            .values()
            .find(|p| p.name == person_ref)
            .map(|p| p.id.clone())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(SearchPolicy::default())
    }
}

#[async_trait]
impl CatalogBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        // Stands in for whichever engine a test registers it under; Mongo is
        // the canonical first slot.
        BackendKind::Mongo
    }

    async fn insert_title(&self, title: &Title) -> Result<()> {
        title.validate()?;
        let mut state = self.write()?;
        if state.titles.contains_key(&title.id) {
            return Err(Error::AlreadyExists(format!("title '{}'", title.id)));
        }
        state.titles.insert(title.id.clone(), title.clone());
        Ok(())
    }

    async fn get_title(&self, id: &TitleId) -> Result<Title> {
        self.read()?
            .titles
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("title '{id}'")))
    }

    async fn search_titles(
        &self,
        filter: &TitleFilter,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>> {
        let state = self.read()?;
        let mut matches: Vec<Title> = state
            .titles
            .values()
            .filter(|t| query::title_matches(t, filter, self.policy))
            .cloned()
            .collect();
        drop(state);
        query::sort_and_truncate(&mut matches, sort, limit);
        Ok(matches)
    }

    async fn update_title_field(&self, id: &TitleId, update: &FieldUpdate) -> Result<()> {
        let mut state = self.write()?;
        let title = state
            .titles
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("title '{id}'")))?;
        update.apply(title);
        Ok(())
    }

    async fn delete_title(&self, id: &TitleId) -> Result<()> {
        let mut state = self.write()?;
        if state.titles.remove(id).is_none() {
            return Err(Error::NotFound(format!("title '{id}'")));
        }
        state.credits.retain(|(_, title_id), _| title_id != id);
        Ok(())
    }

    async fn insert_person(&self, person: &Person) -> Result<()> {
        person.validate()?;
        let mut state = self.write()?;
        if state.people.contains_key(&person.id) {
            return Err(Error::AlreadyExists(format!("person '{}'", person.id)));
        }
        state.people.insert(person.id.clone(), person.clone());
        Ok(())
    }

    async fn get_person(&self, id: &PersonId) -> Result<Person> {
        self.read()?
            .people
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("person '{id}'")))
    }

    async fn insert_credit(&self, credit: &Credit) -> Result<()> {
        credit.validate()?;
        let mut state = self.write()?;
        state.credits.insert(
            (credit.person_id.clone(), credit.title_id.clone()),
            credit.role.clone(),
        );
        Ok(())
    }

    async fn titles_by_person(
        &self,
        person_ref: &str,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>> {
        let state = self.read()?;
        let Some(person_id) = Self::resolve_person(&state, person_ref) else {
            return Ok(Vec::new());
        };
        let mut titles: Vec<Title> = state
            .credits
            .keys()
            .filter(|(pid, _)| *pid == person_id)
            .filter_map(|(_, tid)| state.titles.get(tid).cloned())
            .collect();
        drop(state);
        query::sort_and_truncate(&mut titles, sort, limit);
        Ok(titles)
    }

    async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>> {
        let state = self.read()?;
        let members = state
            .credits
            .iter()
            .filter(|((_, tid), _)| tid == id)
            .filter_map(|((pid, _), role)| {
                state.people.get(pid).map(|person| CastMember {
                    person: person.clone(),
                    role: Some(role.clone()).filter(|r| !r.is_empty()),
                })
            })
            .collect();
        Ok(members)
    }

    async fn count_by_year(&self) -> Result<Vec<YearCount>> {
        Ok(query::count_by_year(self.read()?.titles.values()))
    }

    async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>> {
        Ok(query::average_rating_by_genre(self.read()?.titles.values()))
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.write()?;
        *state = State::default();
        Ok(())
    }

    async fn load_titles(&self, titles: &[Title]) -> Result<usize> {
        let mut state = self.write()?;
        for title in titles {
            state.titles.insert(title.id.clone(), title.clone());
        }
        Ok(titles.len())
    }

    async fn load_people(&self, people: &[Person]) -> Result<usize> {
        let mut state = self.write()?;
        for person in people {
            state.people.insert(person.id.clone(), person.clone());
        }
        Ok(people.len())
    }

    async fn load_credits(&self, credits: &[Credit]) -> Result<usize> {
        let mut state = self.write()?;
        for credit in credits {
            state.credits.insert(
                (credit.person_id.clone(), credit.title_id.clone()),
                credit.role.clone(),
            );
        }
        Ok(credits.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn title(id: &str) -> Title {
        Title {
            id: TitleId::new(id),
            name: format!("Title {id}"),
            category: crate::models::TitleCategory::Movie,
            release_year: Some(2010),
            genres: vec!["Drama".to_string()],
            rating: Some(7.0),
            votes: Some(100),
            runtime_minutes: Some(95),
            synopsis: None,
        }
    }

    fn person(id: &str, name: &str) -> Person {
        Person {
            id: PersonId::new(id),
            name: name.to_string(),
            birth_year: Some(1970),
        }
    }

    #[tokio::test]
    async fn test_insert_get_round_trip() {
        let backend = MemoryBackend::default();
        let t = title("tt1");
        backend.insert_title(&t).await.unwrap();
        assert_eq!(backend.get_title(&t.id).await.unwrap(), t);
    }

    #[tokio::test]
    async fn test_duplicate_insert_leaves_original() {
        let backend = MemoryBackend::default();
        let original = title("tt1");
        backend.insert_title(&original).await.unwrap();

        let mut second = title("tt1");
        second.name = "Replacement".to_string();
        let err = backend.insert_title(&second).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(backend.get_title(&original.id).await.unwrap().name, original.name);
    }

    #[tokio::test]
    async fn test_credit_upsert_overwrites_role() {
        let backend = MemoryBackend::default();
        backend.insert_title(&title("tt1")).await.unwrap();
        backend.insert_person(&person("nm1", "Alice Example")).await.unwrap();

        let mut credit = Credit {
            person_id: PersonId::new("nm1"),
            title_id: TitleId::new("tt1"),
            role: "First".to_string(),
        };
        backend.insert_credit(&credit).await.unwrap();
        credit.role = "Second".to_string();
        backend.insert_credit(&credit).await.unwrap();

        let cast = backend.people_by_title(&TitleId::new("tt1")).await.unwrap();
        assert_eq!(cast.len(), 1);
        assert_eq!(cast[0].role.as_deref(), Some("Second"));
    }

    #[tokio::test]
    async fn test_delete_cascades_credits() {
        let backend = MemoryBackend::default();
        backend.insert_title(&title("tt1")).await.unwrap();
        backend.insert_person(&person("nm1", "Alice Example")).await.unwrap();
        backend
            .insert_credit(&Credit {
                person_id: PersonId::new("nm1"),
                title_id: TitleId::new("tt1"),
                role: "Lead".to_string(),
            })
            .await
            .unwrap();

        backend.delete_title(&TitleId::new("tt1")).await.unwrap();

        assert!(matches!(
            backend.get_title(&TitleId::new("tt1")).await,
            Err(Error::NotFound(_))
        ));
        let titles = backend
            .titles_by_person("nm1", Sort::year_desc(), 10)
            .await
            .unwrap();
        assert!(titles.is_empty());
    }

    #[tokio::test]
    async fn test_titles_by_person_name_fallback() {
        let backend = MemoryBackend::default();
        backend.insert_title(&title("tt1")).await.unwrap();
        backend.insert_person(&person("nm1", "Alice Example")).await.unwrap();
        backend
            .insert_credit(&Credit {
                person_id: PersonId::new("nm1"),
                title_id: TitleId::new("tt1"),
                role: "Lead".to_string(),
            })
            .await
            .unwrap();

        let by_id = backend.titles_by_person("nm1", Sort::year_desc(), 10).await.unwrap();
        let by_name = backend
            .titles_by_person("Alice Example", Sort::year_desc(), 10)
            .await
            .unwrap();
        assert_eq!(by_id, by_name);
        assert_eq!(by_id.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_person_yields_empty_list() {
        let backend = MemoryBackend::default();
        let titles = backend
            .titles_by_person("nonexistent-id", Sort::year_desc(), 10)
            .await
            .unwrap();
        assert!(titles.is_empty());
    }
}
