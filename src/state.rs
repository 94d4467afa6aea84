use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, HashMap};

use crate::MINIMUM_STAKE;
use crate::account::Account;
use crate::block::ValidatedBlock;
use crate::id::Id;

/// Immutable account view anchored to one finalized block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub block: Id,
    pub height: u64,
    pub accounts: BTreeMap<Id, Account>,
}

impl Snapshot {
    pub fn genesis(block: Id, accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            block,
            height: 0,
            accounts: accounts.into_iter().map(|acc| (acc.id, acc)).collect(),
        }
    }

    pub fn account(&self, id: &Id) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Accounts eligible for assignment, in key order.
    pub fn staked(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(|acc| acc.stake >= MINIMUM_STAKE)
    }
}

struct Inner {
    snaps: HashMap<Id, Snapshot>,
    last: Id,
}

/// Append-only index of snapshots keyed by finalized block id, plus a
/// pointer to the snapshot of greatest height.
pub struct State {
    inner: RwLock<Inner>,
}

impl State {
    pub fn new(genesis: Snapshot) -> Self {
        let last = genesis.block;
        let mut snaps = HashMap::new();
        snaps.insert(last, genesis);
        Self { inner: RwLock::new(Inner { snaps, last }) }
    }

    pub fn at(&self, block: &Id) -> Option<Snapshot> {
        self.inner.read().snaps.get(block).cloned()
    }

    pub fn last(&self) -> Snapshot {
        let inner = self.inner.read();
        inner.snaps[&inner.last].clone()
    }

    pub fn add(&self, snap: Snapshot) {
        let mut inner = self.inner.write();
        if snap.height >= inner.snaps[&inner.last].height {
            inner.last = snap.block;
        }
        inner.snaps.insert(snap.block, snap);
    }

    /// Derive and index the successor snapshot of a finalized block:
    /// every account a transaction touched points at the new block.
    /// Stake movement is settlement's business, not consensus'.
    pub fn extend(&self, block: &ValidatedBlock) -> Option<Snapshot> {
        let prev = self.at(&block.proposal.header.prev)?;
        let id = block.id();
        let mut accounts = prev.accounts;
        for validated in &block.proposal.payload.txns {
            for who in [validated.txn.sender, validated.txn.receiver] {
                if let Some(acc) = accounts.get_mut(&who) {
                    acc.last_block = id;
                }
            }
        }
        let snap = Snapshot { block: id, height: block.height(), accounts };
        self.add(snap.clone());
        Some(snap)
    }
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use sha2::{Sha256, Digest};

    use super::*;
    use crate::account::Keypair;
    use crate::block::{Proposal, ValidatedBlock};
    use crate::txn::{Txn, ValidatedTxn};

    /// A deterministic set of `n` staked participants on a fresh chain.
    /// Keyed by account id so engine tests can pull out specific signers.
    pub fn testnet(n: usize) -> (HashMap<Id, Keypair>, Arc<State>, ValidatedBlock) {
        let kps: Vec<Keypair> = (0..n)
            .map(|i| Keypair::from_seed(Sha256::digest((i as u64).to_be_bytes()).into()))
            .collect();
        let genesis = ValidatedBlock::genesis(&kps[0]);
        let accounts = kps
            .iter()
            .map(|kp| Account::new(kp.public(), MINIMUM_STAKE, genesis.id()));
        let state = Arc::new(State::new(Snapshot::genesis(genesis.id(), accounts)));
        let kps = kps.into_iter().map(|kp| (kp.id(), kp)).collect();
        (kps, state, genesis)
    }

    /// A certificate-free block over `txns`, plus its indexed snapshot.
    pub fn grow(
        state: &State,
        kp: &Keypair,
        prev: &ValidatedBlock,
        txns: Vec<Txn>,
    ) -> ValidatedBlock {
        let txns = txns
            .into_iter()
            .map(|txn| ValidatedTxn { txn, certificates: Vec::new() })
            .collect();
        let block = ValidatedBlock {
            proposal: Proposal::build(kp, prev.id(), prev.height(), txns),
            certificates: Vec::new(),
        };
        assert!(state.extend(&block).is_some());
        block
    }

    #[test]
    fn lookups() {
        let (_, state, genesis) = testnet(4);
        assert_eq!(state.last().block, genesis.id());
        assert_eq!(state.last().height, 0);
        assert!(state.at(&genesis.id()).is_some());
        assert!(state.at(&Id::of(&"nowhere")).is_none());
    }

    #[test]
    fn extended() {
        let (kps, state, genesis) = testnet(4);
        let mut ids = kps.keys().copied();
        let (alice, bob) = (ids.next().unwrap(), ids.next().unwrap());
        let txn = Txn {
            reference_block: genesis.id(),
            sender: alice,
            receiver: bob,
            amount: 1,
        };
        let block = grow(&state, &kps[&alice], &genesis, vec![txn]);
        let snap = state.at(&block.id()).unwrap();
        assert_eq!(snap.height, 1);
        assert_eq!(state.last().block, block.id());
        // touched accounts moved, the others stayed on genesis
        assert_eq!(snap.account(&alice).unwrap().last_block, block.id());
        assert_eq!(snap.account(&bob).unwrap().last_block, block.id());
        let other = ids.next().unwrap();
        assert_eq!(snap.account(&other).unwrap().last_block, genesis.id());
        // the genesis snapshot is untouched
        let old = state.at(&genesis.id()).unwrap();
        assert_eq!(old.account(&alice).unwrap().last_block, genesis.id());
    }

    #[test]
    fn unknownprev() {
        let (kps, state, genesis) = testnet(4);
        let kp = kps.values().next().unwrap();
        let orphan = ValidatedBlock {
            proposal: Proposal::build(kp, Id::of(&"missing"), 7, Vec::new()),
            certificates: Vec::new(),
        };
        assert!(state.extend(&orphan).is_none());
        assert_eq!(state.last().block, genesis.id());
    }

    #[test]
    fn stakefilter() {
        let (kps, _, genesis) = testnet(2);
        let mut accounts: Vec<Account> = kps
            .values()
            .map(|kp| Account::new(kp.public(), MINIMUM_STAKE, genesis.id()))
            .collect();
        accounts[0].stake = MINIMUM_STAKE - 1;
        let poor = accounts[0].id;
        let snap = Snapshot::genesis(genesis.id(), accounts);
        assert_eq!(snap.staked().count(), 1);
        assert!(snap.staked().all(|acc| acc.id != poor));
        assert!(snap.account(&poor).is_some());
    }
}
