//! Relation naming and the seams to the surrounding system.
//!
//! The execution core does not own a catalog; it names relations with
//! [`RelationKey`] and talks to whatever holds the metadata through the
//! traits below.

use std::fmt;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConvoyResult;
use crate::ipc::WorkerId;
use crate::operator::Operator;
use crate::tuple::Schema;

/// Fully qualified relation name: owning user, program, relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub user: String,
    pub program: String,
    pub relation: String,
}

impl RelationKey {
    pub fn new(
        user: impl Into<String>,
        program: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            program: program.into(),
            relation: relation.into(),
        }
    }

    /// Flattened name used for physical tables: `user_program_relation`.
    pub fn canonical_name(&self) -> String {
        format!("{}_{}_{}", self.user, self.program, self.relation)
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.program, self.relation)
    }
}

/// Resolves a relation name to its schema; `None` means the relation is
/// not cataloged.
pub trait SchemaResolver {
    fn schema_of(&self, key: &RelationKey) -> ConvoyResult<Option<Arc<Schema>>>;
}

/// View of cluster membership as the coordinator sees it.
pub trait Membership {
    /// Workers currently considered alive, ascending by id.
    fn alive_workers(&self) -> Vec<WorkerId>;
}

impl Membership for crate::ipc::WorkerRegistry {
    fn alive_workers(&self) -> Vec<WorkerId> {
        crate::ipc::WorkerRegistry::alive_workers(self)
    }
}

/// Entry point for loading a dataset into the cluster: the rows produced
/// by `source` become relation `key` on the given workers (all alive
/// workers when `None`). May fail when no target worker is reachable.
pub trait DatasetIngest {
    fn ingest_dataset(
        &self,
        key: &RelationKey,
        workers: Option<Vec<WorkerId>>,
        source: Box<dyn Operator>,
    ) -> ConvoyResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_is_flat() {
        let key = RelationKey::new("alice", "demo", "edges");
        assert_eq!(key.canonical_name(), "alice_demo_edges");
        assert_eq!(key.to_string(), "alice:demo:edges");
    }

    #[test]
    fn keys_hash_by_all_three_parts() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(RelationKey::new("a", "p", "r"));
        assert!(!set.insert(RelationKey::new("a", "p", "r")));
        assert!(set.insert(RelationKey::new("a", "p", "r2")));
    }
}
