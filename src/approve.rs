use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{SIGNATURE_THRESHOLD, VALIDATOR_THRESHOLD};
use crate::account::Keypair;
use crate::assign;
use crate::block::{Approval, Proposal, TxnApproval};
use crate::id::{Id, TAG_VALIDATOR};
use crate::network::{Conduit, Message};
use crate::state::State;
use crate::txn::Txn;
use crate::validate;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no snapshot for block {0}")]
    UnknownSnapshot(Id),
    #[error(transparent)]
    Assign(#[from] assign::Error),
    #[error("unexpected entity on channel")]
    UnexpectedEntity,
}

/// The validating counterpart of the proposer engine: check that the
/// entity was assigned to this node, run the protocol predicates, and
/// answer with a signed approval or not at all.
pub struct Engine {
    kp: Keypair,
    state: Arc<State>,
    proposed: Arc<dyn Conduit>,
    txns: Arc<dyn Conduit>,
}

impl Engine {
    pub fn new(
        kp: Keypair,
        state: Arc<State>,
        proposed: Arc<dyn Conduit>,
        txns: Arc<dyn Conduit>,
    ) -> Self {
        Self { kp, state, proposed, txns }
    }

    pub fn id(&self) -> Id {
        self.kp.id()
    }

    /// Validate a proposal assigned to this node and send the approval
    /// back to its proposer. Entities not assigned here, and entities
    /// that fail a protocol rule, are dropped without a response.
    pub fn on_proposal(&self, proposal: Proposal) -> Result<(), Error> {
        let prev = proposal.header.prev;
        let snap = self.state.at(&prev).ok_or(Error::UnknownSnapshot(prev))?;
        let validators =
            assign::assign(&proposal.id().tagged(TAG_VALIDATOR), &snap, VALIDATOR_THRESHOLD)?;
        if !validators.contains(&self.id()) {
            debug!("block {}: not an assigned validator", proposal.id());
            return Ok(());
        }
        if !validate::proposal(&proposal, &self.state) {
            warn!("block {} breaks protocol rules, discarding", proposal.id());
            return Ok(());
        }
        let approval = Approval::new(&self.kp, proposal.id());
        if let Err(e) = self.proposed.unicast(Message::Approval(approval), proposal.header.proposer)
        {
            warn!("approval delivery to {} failed: {}", proposal.header.proposer, e);
        }
        Ok(())
    }

    /// Same dance for a bare transaction: the approval goes back to
    /// the transaction's sender.
    pub fn on_txn(&self, txn: Txn) -> Result<(), Error> {
        let snap = self.state.last();
        let assigned =
            assign::assign(&txn.id().tagged(TAG_VALIDATOR), &snap, SIGNATURE_THRESHOLD)?;
        if !assigned.contains(&self.id()) {
            debug!("txn {}: not an assigned validator", txn.id());
            return Ok(());
        }
        if !validate::txn(&txn, &self.state) {
            warn!("txn {} breaks protocol rules, discarding", txn.id());
            return Ok(());
        }
        let approval = TxnApproval::new(&self.kp, txn.id());
        if let Err(e) = self.txns.unicast(Message::TxnApproval(approval), txn.sender) {
            warn!("txn approval delivery to {} failed: {}", txn.sender, e);
        }
        Ok(())
    }

    pub fn process(&self, msg: Message) -> Result<(), Error> {
        match msg {
            Message::Proposal(proposal) => self.on_proposal(proposal),
            Message::Txn(txn) => self.on_txn(txn),
            _ => Err(Error::UnexpectedEntity),
        }
    }
}
