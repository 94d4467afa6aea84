use serde::{Serialize, Deserialize};

use crate::account::{Keypair, Signature};
use crate::id::Id;
use crate::txn::ValidatedTxn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub height: u64,
    pub prev: Id,
    pub proposer: Id,
    pub payload: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub txns: Vec<ValidatedTxn>,
}

impl Payload {
    pub fn id(&self) -> Id {
        Id::of(self)
    }
}

/// The in-flight, unfinalized block. Its identity is the header hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    pub header: Header,
    pub payload: Payload,
    pub signature: Signature,
}

impl Proposal {
    /// Build and sign a proposal extending the block `(prev, height)`.
    pub fn build(kp: &Keypair, prev: Id, height: u64, txns: Vec<ValidatedTxn>) -> Self {
        let payload = Payload { txns };
        let header = Header {
            height: height + 1,
            prev,
            proposer: kp.id(),
            payload: payload.id(),
        };
        let signature = kp.sign(&header);
        Self { header, payload, signature }
    }

    pub fn id(&self) -> Id {
        Id::of(&self.header)
    }
}

/// A proposal plus a quorum of validator certificates. This is the
/// entity that gets persisted and becomes the new chain tip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatedBlock {
    pub proposal: Proposal,
    pub certificates: Vec<Signature>,
}

impl ValidatedBlock {
    /// Chain root: height 0, no parent, empty payload, no certificates.
    pub fn genesis(kp: &Keypair) -> Self {
        let payload = Payload { txns: Vec::new() };
        let header = Header {
            height: 0,
            prev: Id::default(),
            proposer: kp.id(),
            payload: payload.id(),
        };
        let signature = kp.sign(&header);
        Self {
            proposal: Proposal { header, payload, signature },
            certificates: Vec::new(),
        }
    }

    pub fn id(&self) -> Id {
        self.proposal.id()
    }

    pub fn height(&self) -> u64 {
        self.proposal.header.height
    }
}

/// One validator's vote on a proposal: a signature over the block id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Approval {
    pub block: Id,
    pub signature: Signature,
}

impl Approval {
    pub fn new(kp: &Keypair, block: Id) -> Self {
        Self { block, signature: kp.sign(&block) }
    }
}

/// Symmetric vote on a single transaction, sent back to its sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxnApproval {
    pub txn: Id,
    pub signature: Signature,
}

impl TxnApproval {
    pub fn new(kp: &Keypair, txn: Id) -> Self {
        Self { txn, signature: kp.sign(&txn) }
    }
}
