use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::block::{Proposal, ValidatedBlock};
use crate::id::Id;
use crate::txn::ValidatedTxn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("a proposal is already recorded as pending")]
    ProposalPending,
}

/// Finalized blocks by id.
#[derive(Default)]
pub struct Blocks {
    inner: Mutex<HashMap<Id, ValidatedBlock>>,
}

impl Blocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has(&self, id: &Id) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    pub async fn add(&self, block: ValidatedBlock) {
        self.inner.lock().await.insert(block.id(), block);
    }

    pub async fn by_id(&self, id: &Id) -> Option<ValidatedBlock> {
        self.inner.lock().await.get(id).cloned()
    }

    pub async fn at_height(&self, height: u64) -> Option<ValidatedBlock> {
        self.inner
            .lock()
            .await
            .values()
            .find(|block| block.height() == height)
            .cloned()
    }

    pub async fn all(&self) -> Vec<ValidatedBlock> {
        let mut blocks: Vec<ValidatedBlock> = self.inner.lock().await.values().cloned().collect();
        blocks.sort_by_key(|block| (block.height(), block.id()));
        blocks
    }
}

/// The pending pool of fully-certified transactions a proposer drains.
#[derive(Default)]
pub struct Pool {
    inner: Mutex<BTreeMap<Id, ValidatedTxn>>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has(&self, id: &Id) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    pub async fn add(&self, txn: ValidatedTxn) {
        self.inner.lock().await.insert(txn.id(), txn);
    }

    pub async fn remove(&self, id: &Id) -> Option<ValidatedTxn> {
        self.inner.lock().await.remove(id)
    }

    pub async fn get(&self, id: &Id) -> Option<ValidatedTxn> {
        self.inner.lock().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<ValidatedTxn> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Take exactly `count` transactions in id order, or none at all.
    pub async fn drain(&self, count: usize) -> Option<Vec<ValidatedTxn>> {
        let mut inner = self.inner.lock().await;
        if inner.len() < count {
            return None;
        }
        let ids: Vec<Id> = inner.keys().take(count).copied().collect();
        Some(ids.iter().map(|id| inner.remove(id).expect("key just listed")).collect())
    }
}

/// The persistence side of the one-pending-proposal invariant.
#[derive(Default)]
pub struct Proposals {
    inner: Mutex<Option<Proposal>>,
}

impl Proposals {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_last(&self, proposal: Proposal) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            return Err(Error::ProposalPending);
        }
        *inner = Some(proposal);
        Ok(())
    }

    pub async fn get_last(&self) -> Option<Proposal> {
        self.inner.lock().await.clone()
    }

    pub async fn clear_last(&self) {
        *self.inner.lock().await = None;
    }
}
