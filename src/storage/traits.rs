//! The backend operation contract.

use async_trait::async_trait;

use crate::models::{
    CastMember, Credit, FieldUpdate, GenreAverage, Person, PersonId, Sort, Title, TitleFilter,
    TitleId, YearCount,
};
use crate::Result;

/// The fixed operation contract every storage engine implements.
///
/// All operations are synchronous from the orchestrator's point of view: a
/// returned `Ok` means the write is durably applied under the engine's own
/// consistency model, including any derived index structures. Writes that
/// touch both a primary record and derived structures (secondary index sets,
/// reverse-lookup tables) apply every derived mutation before returning.
///
/// Errors use the shared taxonomy in [`crate::Error`]; adapters translate
/// native driver errors at the point of capture.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// The engine this adapter fronts, used as the map key in fan-out results.
    fn kind(&self) -> super::BackendKind;

    /// Inserts a title.
    ///
    /// Fails with `AlreadyExists` on a duplicate canonical id, leaving the
    /// stored record unchanged.
    async fn insert_title(&self, title: &Title) -> Result<()>;

    /// Fetches a title by canonical id.
    ///
    /// Fails with `NotFound` when absent.
    async fn get_title(&self, id: &TitleId) -> Result<Title>;

    /// Searches titles under the canonical filter vocabulary.
    ///
    /// Results satisfy the filter under the future-release exception rule,
    /// ordered by `sort` with the shared missing-value and tiebreak
    /// semantics, truncated to `limit`.
    async fn search_titles(
        &self,
        filter: &TitleFilter,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>>;

    /// Applies a single-field update to a title.
    ///
    /// Fails with `NotFound` when the id is absent. Engines with derived
    /// index structures keyed on the updated field rewrite those entries in
    /// the same operation.
    async fn update_title_field(&self, id: &TitleId, update: &FieldUpdate) -> Result<()>;

    /// Deletes a title, cascading over its credits.
    ///
    /// Every credit row, edge, or index entry referencing the title is
    /// retracted before the call returns. Fails with `NotFound` when absent.
    async fn delete_title(&self, id: &TitleId) -> Result<()>;

    /// Inserts a person.
    async fn insert_person(&self, person: &Person) -> Result<()>;

    /// Fetches a person by canonical id.
    async fn get_person(&self, id: &PersonId) -> Result<Person>;

    /// Records an appearance credit.
    ///
    /// Upserts: a repeated (person, title) pair overwrites the stored role
    /// rather than duplicating the association.
    async fn insert_credit(&self, credit: &Credit) -> Result<()>;

    /// All titles a person appears in, hydrated and de-duplicated.
    ///
    /// `person_ref` is resolved as a canonical id first, then as an exact
    /// name. An unresolved reference yields an empty list, not an error.
    async fn titles_by_person(
        &self,
        person_ref: &str,
        sort: Sort,
        limit: usize,
    ) -> Result<Vec<Title>>;

    /// All people credited in a title, hydrated, with their role labels.
    ///
    /// Deterministic order: person id ascending. An unknown title yields an
    /// empty list.
    async fn people_by_title(&self, id: &TitleId) -> Result<Vec<CastMember>>;

    /// Counts titles per release year, ascending by year.
    async fn count_by_year(&self) -> Result<Vec<YearCount>>;

    /// Average rating per genre, descending by average.
    async fn average_rating_by_genre(&self) -> Result<Vec<GenreAverage>>;

    /// Drops all catalog data, leaving schema/index structures ready for a
    /// fresh bulk load.
    async fn reset(&self) -> Result<()>;

    /// Bulk-inserts pre-validated titles with the engine's batch primitive.
    ///
    /// Returns the number inserted. Unlike [`Self::insert_title`], existing
    /// ids are overwritten; bulk loads follow a reset.
    async fn load_titles(&self, titles: &[Title]) -> Result<usize>;

    /// Bulk-inserts pre-validated people.
    async fn load_people(&self, people: &[Person]) -> Result<usize>;

    /// Bulk-inserts pre-validated credits.
    async fn load_credits(&self, credits: &[Credit]) -> Result<usize>;
}
