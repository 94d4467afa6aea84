use std::collections::BTreeSet;

use crate::{MAX_TRANSACTIONS_NUM, MINIMUM_STAKE, MIN_TRANSACTIONS_NUM, SIGNATURE_THRESHOLD};
use crate::account;
use crate::block::Proposal;
use crate::state::{Snapshot, State};
use crate::txn::{Txn, ValidatedTxn};

// Each predicate checks one protocol rule and answers false, never
// panics, when a snapshot or account it needs cannot be resolved.
// Callers decide whether an unresolved dependency is fatal.

/// Previous block resolves to a snapshot, the proposer is known there,
/// and the transaction count is within protocol bounds.
pub fn is_correct(prop: &Proposal, state: &State) -> bool {
    let snap = match state.at(&prop.header.prev) {
        Some(snap) => snap,
        None => return false,
    };
    if snap.account(&prop.header.proposer).is_none() {
        return false;
    }
    (MIN_TRANSACTIONS_NUM..=MAX_TRANSACTIONS_NUM).contains(&prop.payload.txns.len())
}

/// The proposal extends the local chain tip. No forks accepted here.
pub fn is_consistent(prop: &Proposal, state: &State) -> bool {
    state.last().block == prop.header.prev
}

/// The proposer's key at the previous snapshot signed this header.
pub fn is_authenticated(prop: &Proposal, state: &State) -> bool {
    let snap = match state.at(&prop.header.prev) {
        Some(snap) => snap,
        None => return false,
    };
    match snap.account(&prop.header.proposer) {
        Some(acc) => account::verify(&acc.pk, &prop.header, &prop.signature),
        None => false,
    }
}

pub fn proposer_has_enough_stake(prop: &Proposal, state: &State) -> bool {
    let snap = match state.at(&prop.header.prev) {
        Some(snap) => snap,
        None => return false,
    };
    match snap.account(&prop.header.proposer) {
        Some(acc) => acc.stake >= MINIMUM_STAKE,
        None => false,
    }
}

/// Every included transaction carries a quorum of certificates, each
/// from a distinct staked account of the previous snapshot.
pub fn all_txns_validated(prop: &Proposal, state: &State) -> bool {
    let snap = match state.at(&prop.header.prev) {
        Some(snap) => snap,
        None => return false,
    };
    prop.payload.txns.iter().all(|validated| certified(validated, &snap))
}

fn certified(validated: &ValidatedTxn, snap: &Snapshot) -> bool {
    if validated.certificates.len() < SIGNATURE_THRESHOLD as usize {
        return false;
    }
    let id = validated.id();
    let mut signers = BTreeSet::new();
    for cert in &validated.certificates {
        // certificates carry no signer id; resolve by trial verification
        let found = snap
            .staked()
            .find(|acc| !signers.contains(&acc.id) && account::verify(&acc.pk, &id, cert));
        match found {
            Some(acc) => signers.insert(acc.id),
            None => return false,
        };
    }
    true
}

/// Every transaction references a block strictly newer than the last
/// block that changed its sender. Guards against replays over stale
/// state.
pub fn all_txns_sound(prop: &Proposal, state: &State) -> bool {
    let snap = match state.at(&prop.header.prev) {
        Some(snap) => snap,
        None => return false,
    };
    prop.payload.txns.iter().all(|validated| sound(&validated.txn, &snap, state))
}

fn sound(txn: &Txn, snap: &Snapshot, state: &State) -> bool {
    let sender = match snap.account(&txn.sender) {
        Some(acc) => acc,
        None => return false,
    };
    let last = match state.at(&sender.last_block) {
        Some(snap) => snap,
        None => return false,
    };
    let reference = match state.at(&txn.reference_block) {
        Some(snap) => snap,
        None => return false,
    };
    reference.height > last.height
}

pub fn no_duplicate_sender(prop: &Proposal) -> bool {
    let senders: BTreeSet<_> = prop.payload.txns.iter().map(|v| v.txn.sender).collect();
    senders.len() == prop.payload.txns.len()
}

/// All block rules at once.
pub fn proposal(prop: &Proposal, state: &State) -> bool {
    is_correct(prop, state)
        && is_consistent(prop, state)
        && is_authenticated(prop, state)
        && proposer_has_enough_stake(prop, state)
        && no_duplicate_sender(prop)
        && all_txns_validated(prop, state)
        && all_txns_sound(prop, state)
}

/// The reference block resolves and the sender is known there.
pub fn txn_is_correct(txn: &Txn, state: &State) -> bool {
    match state.at(&txn.reference_block) {
        Some(snap) => snap.account(&txn.sender).is_some(),
        None => false,
    }
}

pub fn txn_is_sound(txn: &Txn, state: &State) -> bool {
    sound(txn, &state.last(), state)
}

/// All transaction rules at once.
pub fn txn(txn: &Txn, state: &State) -> bool {
    txn_is_correct(txn, state) && txn_is_sound(txn, state)
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::account::{Account, Keypair};
    use crate::block::ValidatedBlock;
    use crate::id::Id;
    use crate::state::tests::{grow, testnet};
    use crate::state::Snapshot;

    pub struct Net {
        pub kps: HashMap<Id, Keypair>,
        pub state: Arc<State>,
        pub genesis: ValidatedBlock,
        pub tip: ValidatedBlock,
    }

    // Sound transactions need a reference block newer than the last
    // block that touched their sender, so everything builds on a tip
    // one block past genesis.
    pub fn net(n: usize) -> Net {
        let (kps, state, genesis) = testnet(n);
        let kp = kps.values().next().unwrap();
        let tip = grow(&state, kp, &genesis, Vec::new());
        Net { kps, state, genesis, tip }
    }

    impl Net {
        pub fn ids(&self) -> Vec<Id> {
            let mut ids: Vec<Id> = self.kps.keys().copied().collect();
            ids.sort();
            ids
        }

        /// `count` sound transactions with distinct senders, each
        /// certified by the first `SIGNATURE_THRESHOLD` accounts.
        pub fn txns(&self, count: usize) -> Vec<ValidatedTxn> {
            let ids = self.ids();
            (0..count)
                .map(|i| {
                    let txn = Txn {
                        reference_block: self.tip.id(),
                        sender: ids[i],
                        receiver: ids[(i + 1) % ids.len()],
                        amount: 1 + i as u32,
                    };
                    let certificates = ids
                        .iter()
                        .take(SIGNATURE_THRESHOLD as usize)
                        .map(|id| self.kps[id].sign(&txn.id()))
                        .collect();
                    ValidatedTxn { txn, certificates }
                })
                .collect()
        }

        pub fn proposal(&self) -> Proposal {
            let proposer = &self.kps[&self.ids()[0]];
            Proposal::build(proposer, self.tip.id(), self.tip.height(), self.txns(MIN_TRANSACTIONS_NUM))
        }
    }

    #[test]
    fn valid() {
        let net = net(8);
        let prop = net.proposal();
        assert!(is_correct(&prop, &net.state));
        assert!(is_consistent(&prop, &net.state));
        assert!(is_authenticated(&prop, &net.state));
        assert!(proposer_has_enough_stake(&prop, &net.state));
        assert!(no_duplicate_sender(&prop));
        assert!(all_txns_validated(&prop, &net.state));
        assert!(all_txns_sound(&prop, &net.state));
        assert!(proposal(&prop, &net.state));
    }

    #[test]
    fn missingprev() {
        let net = net(8);
        let mut prop = net.proposal();
        prop.header.prev = Id::of(&"nowhere");
        assert!(!is_correct(&prop, &net.state));
        assert!(!is_authenticated(&prop, &net.state));
        assert!(!proposal(&prop, &net.state));
    }

    #[test]
    fn unknownproposer() {
        let net = net(8);
        let outsider = Keypair::gen();
        let prop = Proposal::build(&outsider, net.tip.id(), net.tip.height(), net.txns(MIN_TRANSACTIONS_NUM));
        assert!(!is_correct(&prop, &net.state));
        assert!(!is_authenticated(&prop, &net.state));
    }

    #[test]
    fn txncount() {
        let net = net(8);
        let proposer = &net.kps[&net.ids()[0]];
        let empty = Proposal::build(proposer, net.tip.id(), net.tip.height(), Vec::new());
        assert!(!is_correct(&empty, &net.state));
        let mut bloated = net.txns(1);
        for i in 0..MAX_TRANSACTIONS_NUM {
            let mut extra = bloated[0].clone();
            extra.txn.amount = 1000 + i as u32;
            bloated.push(extra);
        }
        let bloated = Proposal::build(proposer, net.tip.id(), net.tip.height(), bloated);
        assert!(!is_correct(&bloated, &net.state));
    }

    #[test]
    fn inconsistent() {
        let net = net(8);
        // extends genesis while the tip has moved past it
        let proposer = &net.kps[&net.ids()[0]];
        let stale = Proposal::build(proposer, net.genesis.id(), 0, net.txns(MIN_TRANSACTIONS_NUM));
        assert!(is_correct(&stale, &net.state));
        assert!(!is_consistent(&stale, &net.state));
    }

    #[test]
    fn unauthenticated() {
        let net = net(8);
        let mut prop = net.proposal();
        prop.signature = net.kps[&net.ids()[1]].sign(&prop.header);
        assert!(!is_authenticated(&prop, &net.state));
        let mut tampered = net.proposal();
        tampered.header.payload = Id::of(&"swapped");
        assert!(!is_authenticated(&tampered, &net.state));
    }

    #[test]
    fn poorstake() {
        let (kps, _, genesis) = testnet(8);
        let mut ids: Vec<Id> = kps.keys().copied().collect();
        ids.sort();
        let accounts = ids.iter().map(|id| {
            let stake = if *id == ids[0] { MINIMUM_STAKE - 1 } else { MINIMUM_STAKE };
            Account::new(kps[id].public(), stake, genesis.id())
        });
        let state = State::new(Snapshot::genesis(genesis.id(), accounts));
        let txns = (0..MIN_TRANSACTIONS_NUM)
            .map(|i| ValidatedTxn {
                txn: Txn {
                    reference_block: genesis.id(),
                    sender: ids[i],
                    receiver: ids[i + 1],
                    amount: 1,
                },
                certificates: Vec::new(),
            })
            .collect();
        let prop = Proposal::build(&kps[&ids[0]], genesis.id(), 0, txns);
        assert!(is_correct(&prop, &state));
        assert!(!proposer_has_enough_stake(&prop, &state));
    }

    #[test]
    fn uncertified() {
        let net = net(8);
        let proposer = &net.kps[&net.ids()[0]];
        // one certificate short
        let mut txns = net.txns(MIN_TRANSACTIONS_NUM);
        txns[0].certificates.pop();
        let prop = Proposal::build(proposer, net.tip.id(), net.tip.height(), txns);
        assert!(!all_txns_validated(&prop, &net.state));
        // threshold met but all by the same signer
        let mut txns = net.txns(MIN_TRANSACTIONS_NUM);
        let sig = txns[0].certificates[0];
        txns[0].certificates = vec![sig; SIGNATURE_THRESHOLD as usize];
        let prop = Proposal::build(proposer, net.tip.id(), net.tip.height(), txns);
        assert!(!all_txns_validated(&prop, &net.state));
        // threshold met but one signer is nobody we know
        let mut txns = net.txns(MIN_TRANSACTIONS_NUM);
        txns[1].certificates[2] = Keypair::gen().sign(&txns[1].id());
        let prop = Proposal::build(proposer, net.tip.id(), net.tip.height(), txns);
        assert!(!all_txns_validated(&prop, &net.state));
    }

    #[test]
    fn unsound() {
        let net = net(8);
        let proposer = &net.kps[&net.ids()[0]];
        let mut txns = net.txns(MIN_TRANSACTIONS_NUM);
        // genesis is not newer than the sender's last change (genesis)
        txns[2].txn.reference_block = net.genesis.id();
        let prop = Proposal::build(proposer, net.tip.id(), net.tip.height(), txns);
        assert!(!all_txns_sound(&prop, &net.state));
    }

    #[test]
    fn dupsender() {
        let net = net(8);
        let proposer = &net.kps[&net.ids()[0]];
        let mut txns = net.txns(MIN_TRANSACTIONS_NUM);
        txns[1].txn.sender = txns[0].txn.sender;
        let prop = Proposal::build(proposer, net.tip.id(), net.tip.height(), txns);
        assert!(!no_duplicate_sender(&prop));
        assert!(no_duplicate_sender(&net.proposal()));
    }

    #[test]
    fn txnchecks() {
        let net = net(8);
        let ids = net.ids();
        let good = Txn {
            reference_block: net.tip.id(),
            sender: ids[0],
            receiver: ids[1],
            amount: 1,
        };
        assert!(txn_is_correct(&good, &net.state));
        assert!(txn_is_sound(&good, &net.state));
        assert!(txn(&good, &net.state));
        let mut lost = good.clone();
        lost.reference_block = Id::of(&"nowhere");
        assert!(!txn_is_correct(&lost, &net.state));
        let mut stranger = good.clone();
        stranger.sender = Id::of(&"stranger");
        assert!(!txn_is_correct(&stranger, &net.state));
        assert!(!txn_is_sound(&stranger, &net.state));
        let mut stale = good;
        stale.reference_block = net.genesis.id();
        assert!(txn_is_correct(&stale, &net.state));
        assert!(!txn_is_sound(&stale, &net.state));
    }
}
