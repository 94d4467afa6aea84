use serde::{Serialize, Deserialize};

use crate::account::Signature;
use crate::id::Id;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Txn {
    pub reference_block: Id,
    pub sender: Id,
    pub receiver: Id,
    pub amount: u32,
}

impl Txn {
    pub fn id(&self) -> Id {
        Id::of(self)
    }
}

/// A transaction plus the validator certificates that approved it.
/// Composition, not a subtype: the wire/storage boundary distinguishes
/// the two by this envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatedTxn {
    pub txn: Txn,
    pub certificates: Vec<Signature>,
}

impl ValidatedTxn {
    pub fn id(&self) -> Id {
        self.txn.id()
    }
}
