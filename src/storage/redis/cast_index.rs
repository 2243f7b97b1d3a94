//! Bidirectional cast index for the key-value backend.
//!
//! Redis has no join primitive, so the person↔title relation lives in two
//! reverse-lookup sets plus a role entry per pair. Keeping the two directions
//! in sync by hand at every call site is exactly how they drift apart, so the
//! planning lives here: one entry point produces the mutations for both
//! directions, and the adapter applies them in a single pipeline.

use crate::models::{Credit, PersonId, TitleId};

/// Set of person ids credited in a title: `cast:title:{title_id}`.
pub const CAST_BY_TITLE_PREFIX: &str = "cast:title:";
/// Set of title ids a person appears in: `cast:person:{person_id}`.
pub const CAST_BY_PERSON_PREFIX: &str = "cast:person:";
/// Role label per pair: `role:{title_id}:{person_id}`.
pub const ROLE_PREFIX: &str = "role:";

/// One planned key mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMutation {
    /// `SADD key member`.
    SetAdd {
        /// Target set key.
        key: String,
        /// Member to add.
        member: String,
    },
    /// `SREM key member`.
    SetRemove {
        /// Target set key.
        key: String,
        /// Member to remove.
        member: String,
    },
    /// `SET key value`.
    Put {
        /// Target key.
        key: String,
        /// Value to store.
        value: String,
    },
    /// `DEL key`.
    Delete {
        /// Key to drop.
        key: String,
    },
}

/// Plans cast-relation mutations; all methods are pure.
pub struct CastIndex;

impl CastIndex {
    /// Key of the person-id set for a title.
    #[must_use]
    pub fn title_key(title_id: &TitleId) -> String {
        format!("{CAST_BY_TITLE_PREFIX}{title_id}")
    }

    /// Key of the title-id set for a person.
    #[must_use]
    pub fn person_key(person_id: &PersonId) -> String {
        format!("{CAST_BY_PERSON_PREFIX}{person_id}")
    }

    /// Key of the role entry for a (title, person) pair.
    #[must_use]
    pub fn role_key(title_id: &TitleId, person_id: &PersonId) -> String {
        format!("{ROLE_PREFIX}{title_id}:{person_id}")
    }

    /// Plans the mutations recording one credit: both direction sets plus
    /// the role entry. Re-linking an existing pair is idempotent on the sets
    /// and overwrites the role.
    #[must_use]
    pub fn link(credit: &Credit) -> Vec<IndexMutation> {
        vec![
            IndexMutation::SetAdd {
                key: Self::title_key(&credit.title_id),
                member: credit.person_id.to_string(),
            },
            IndexMutation::SetAdd {
                key: Self::person_key(&credit.person_id),
                member: credit.title_id.to_string(),
            },
            IndexMutation::Put {
                key: Self::role_key(&credit.title_id, &credit.person_id),
                value: credit.role.clone(),
            },
        ]
    }

    /// Plans the cascade retracting every credit of a title: each member's
    /// reverse entry and role go, then the forward set itself.
    #[must_use]
    pub fn unlink_title(title_id: &TitleId, members: &[PersonId]) -> Vec<IndexMutation> {
        let mut mutations = Vec::with_capacity(members.len() * 2 + 1);
        for person_id in members {
            mutations.push(IndexMutation::SetRemove {
                key: Self::person_key(person_id),
                member: title_id.to_string(),
            });
            mutations.push(IndexMutation::Delete {
                key: Self::role_key(title_id, person_id),
            });
        }
        mutations.push(IndexMutation::Delete {
            key: Self::title_key(title_id),
        });
        mutations
    }
}

/// Appends planned mutations to a pipeline.
pub fn apply(pipe: &mut redis::Pipeline, mutations: &[IndexMutation]) {
    for mutation in mutations {
        match mutation {
            IndexMutation::SetAdd { key, member } => {
                pipe.sadd(key, member).ignore();
            },
            IndexMutation::SetRemove { key, member } => {
                pipe.srem(key, member).ignore();
            },
            IndexMutation::Put { key, value } => {
                pipe.set(key, value).ignore();
            },
            IndexMutation::Delete { key } => {
                pipe.del(key).ignore();
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit() -> Credit {
        Credit {
            person_id: PersonId::new("nm1"),
            title_id: TitleId::new("tt1"),
            role: "Lead".to_string(),
        }
    }

    #[test]
    fn test_link_writes_both_directions() {
        let mutations = CastIndex::link(&credit());
        assert!(mutations.contains(&IndexMutation::SetAdd {
            key: "cast:title:tt1".to_string(),
            member: "nm1".to_string(),
        }));
        assert!(mutations.contains(&IndexMutation::SetAdd {
            key: "cast:person:nm1".to_string(),
            member: "tt1".to_string(),
        }));
        assert!(mutations.contains(&IndexMutation::Put {
            key: "role:tt1:nm1".to_string(),
            value: "Lead".to_string(),
        }));
    }

    #[test]
    fn test_unlink_title_retracts_every_reference() {
        let title = TitleId::new("tt1");
        let members = vec![PersonId::new("nm1"), PersonId::new("nm2")];
        let mutations = CastIndex::unlink_title(&title, &members);

        for person in &members {
            assert!(mutations.contains(&IndexMutation::SetRemove {
                key: CastIndex::person_key(person),
                member: "tt1".to_string(),
            }));
            assert!(mutations.contains(&IndexMutation::Delete {
                key: CastIndex::role_key(&title, person),
            }));
        }
        assert_eq!(
            mutations.last(),
            Some(&IndexMutation::Delete {
                key: "cast:title:tt1".to_string()
            })
        );
    }

    #[test]
    fn test_link_then_unlink_is_symmetric() {
        let credit = credit();
        let linked = CastIndex::link(&credit);
        let unlinked = CastIndex::unlink_title(&credit.title_id, &[credit.person_id.clone()]);

        // Every key the link touches is covered by the unlink plan.
        let linked_keys: Vec<&String> = linked
            .iter()
            .map(|m| match m {
                IndexMutation::SetAdd { key, .. }
                | IndexMutation::SetRemove { key, .. }
                | IndexMutation::Put { key, .. }
                | IndexMutation::Delete { key } => key,
            })
            .collect();
        for key in linked_keys {
            assert!(unlinked.iter().any(|m| match m {
                IndexMutation::SetAdd { key: k, .. }
                | IndexMutation::SetRemove { key: k, .. }
                | IndexMutation::Put { key: k, .. }
                | IndexMutation::Delete { key: k } => k == key,
            }));
        }
    }
}
