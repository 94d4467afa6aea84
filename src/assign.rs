use sha2::{Sha256, Digest};
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::id::Id;
use crate::state::Snapshot;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("requested {want} assignees but only {have} accounts are staked")]
    TooFewStaked { want: u16, have: usize },
}

/// The output of one `assign` call: a duplicate-free set of account
/// identifiers with deterministic membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment(BTreeSet<Id>);

impl Assignment {
    pub fn contains(&self, id: &Id) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Id> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deterministically sample `count` distinct staked accounts of
/// `snapshot`, seeded by `seed`. Every staked account gets the rank
/// `Sha256(seed || account id)`; the lowest `count` ranks win. A pure
/// function: same inputs, bit-for-bit same assignment, on every node.
pub fn assign(seed: &Id, snapshot: &Snapshot, count: u16) -> Result<Assignment, Error> {
    let mut ranked: Vec<([u8; 32], Id)> = snapshot
        .staked()
        .map(|acc| {
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(acc.id.as_bytes());
            (hasher.finalize().into(), acc.id)
        })
        .collect();
    if count as usize > ranked.len() {
        return Err(Error::TooFewStaked { want: count, have: ranked.len() });
    }
    ranked.sort();
    Ok(Assignment(
        ranked
            .into_iter()
            .take(count as usize)
            .map(|(_, id)| id)
            .collect(),
    ))
}
