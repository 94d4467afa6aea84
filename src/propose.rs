use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    MIN_TRANSACTIONS_NUM, POOL_BACKOFF_CAP_MS, POOL_BACKOFF_MS, POOL_RETRIES, VALIDATOR_THRESHOLD,
};
use crate::account::{self, Keypair};
use crate::assign::{self, Assignment};
use crate::block::{Approval, Proposal, ValidatedBlock};
use crate::id::{Id, TAG_PROPOSER, TAG_VALIDATOR};
use crate::network::{self, Conduit, Message};
use crate::state::State;
use crate::store;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("block {0} not in storage")]
    UnknownBlock(Id),
    #[error("no snapshot for block {0}")]
    UnknownSnapshot(Id),
    #[error("a proposal is already pending")]
    RoundInProgress,
    #[error("no proposal is pending")]
    NoPendingProposal,
    #[error("approval for block {got}, pending is {want}")]
    WrongBlock { want: Id, got: Id },
    #[error("approval for block {0} matches no uncounted assigned validator")]
    BadApproval(Id),
    #[error("transaction pool stayed under the block minimum")]
    StarvedPool,
    #[error(transparent)]
    Assign(#[from] assign::Error),
    #[error("conduit: {0}")]
    Conduit(#[from] network::Error),
    #[error(transparent)]
    Slot(#[from] store::Error),
    #[error("unexpected entity on channel")]
    UnexpectedEntity,
}

#[derive(Default)]
struct Round {
    pending: Option<Proposal>,
    validators: Assignment,
    signers: BTreeSet<Id>,
    approvals: Vec<Approval>,
}

/// The per-node round state machine: build and fan out one proposal,
/// accumulate approvals, finalize at quorum. At most one proposal is
/// pending at a time; both triggers serialize on the round lock.
pub struct Engine {
    kp: Keypair,
    state: Arc<State>,
    blocks: Arc<store::Blocks>,
    pool: Arc<store::Pool>,
    proposals: Arc<store::Proposals>,
    proposed: Arc<dyn Conduit>,
    validated: Arc<dyn Conduit>,
    round: Mutex<Round>,
}

impl Engine {
    pub fn new(
        kp: Keypair,
        state: Arc<State>,
        blocks: Arc<store::Blocks>,
        pool: Arc<store::Pool>,
        proposals: Arc<store::Proposals>,
        proposed: Arc<dyn Conduit>,
        validated: Arc<dyn Conduit>,
    ) -> Self {
        Self {
            kp,
            state,
            blocks,
            pool,
            proposals,
            proposed,
            validated,
            round: Mutex::new(Round::default()),
        }
    }

    pub fn id(&self) -> Id {
        self.kp.id()
    }

    /// A block was finalized. If the assigner picks this node, start
    /// the next round: drain the pool, build and sign the proposal,
    /// and unicast it to every assigned validator.
    pub async fn on_validated_block(&self, block: Id) -> Result<(), Error> {
        let tip = self.blocks.by_id(&block).await.ok_or(Error::UnknownBlock(block))?;
        let snap = self.state.at(&block).ok_or(Error::UnknownSnapshot(block))?;
        let proposers = assign::assign(&block.tagged(TAG_PROPOSER), &snap, 1)?;
        if !proposers.contains(&self.id()) {
            debug!("block {}: not the proposer", block);
            return Ok(());
        }
        if self.round.lock().await.pending.is_some() {
            // round overlap is a bug, not a race to paper over
            return Err(Error::RoundInProgress);
        }
        // wait for the pool without holding the round lock
        let mut wait = POOL_BACKOFF_MS;
        let mut polls = 0;
        let txns = loop {
            if let Some(txns) = self.pool.drain(MIN_TRANSACTIONS_NUM).await {
                break txns;
            }
            polls += 1;
            if polls >= POOL_RETRIES {
                return Err(Error::StarvedPool);
            }
            tokio::time::sleep(Duration::from_millis(wait)).await;
            wait = (wait * 2).min(POOL_BACKOFF_CAP_MS);
        };
        let proposal = Proposal::build(&self.kp, block, tip.height(), txns);
        let validators =
            assign::assign(&proposal.id().tagged(TAG_VALIDATOR), &snap, VALIDATOR_THRESHOLD)?;
        let mut round = self.round.lock().await;
        if round.pending.is_some() {
            return Err(Error::RoundInProgress);
        }
        for validator in validators.iter() {
            if let Err(e) = self.proposed.unicast(Message::Proposal(proposal.clone()), *validator) {
                // abort with nothing recorded: no partially-sent round
                for txn in proposal.payload.txns {
                    self.pool.add(txn).await;
                }
                return Err(Error::Conduit(e));
            }
        }
        self.proposals.set_last(proposal.clone()).await?;
        info!(
            "proposing block {} at height {} to {} validators",
            proposal.id(),
            proposal.header.height,
            validators.len()
        );
        round.validators = validators;
        round.signers.clear();
        round.approvals.clear();
        round.pending = Some(proposal);
        Ok(())
    }

    /// A validator vote arrived. Count it if it is for the pending
    /// proposal and verifies under an assigned validator we have not
    /// heard from yet; at quorum, finalize and tell the whole network.
    pub async fn on_approval(&self, approval: Approval) -> Result<(), Error> {
        let mut round = self.round.lock().await;
        let (pending, prev) = match round.pending {
            Some(ref proposal) => (proposal.id(), proposal.header.prev),
            None => return Err(Error::NoPendingProposal),
        };
        if approval.block != pending {
            return Err(Error::WrongBlock { want: pending, got: approval.block });
        }
        let snap = self.state.at(&prev).ok_or(Error::UnknownSnapshot(prev))?;
        let signer = round
            .validators
            .iter()
            .copied()
            .filter(|v| !round.signers.contains(v))
            .find(|v| {
                snap.account(v)
                    .map_or(false, |acc| account::verify(&acc.pk, &pending, &approval.signature))
            })
            .ok_or(Error::BadApproval(pending))?;
        round.signers.insert(signer);
        round.approvals.push(approval);
        debug!("approval {}/{} for block {}", round.approvals.len(), VALIDATOR_THRESHOLD, pending);
        if round.approvals.len() < VALIDATOR_THRESHOLD as usize {
            return Ok(());
        }
        // quorum: assemble, clear the round, broadcast to the whole
        // snapshot (self included) as a loop of unicasts
        let certificates = round.approvals.drain(..).map(|a| a.signature).collect();
        let proposal = round.pending.take().expect("pending proposal at quorum");
        round.validators = Assignment::default();
        round.signers.clear();
        let block = ValidatedBlock { proposal, certificates };
        self.proposals.clear_last().await;
        info!("block {} finalized at height {}", block.id(), block.height());
        for acc in snap.accounts.values() {
            if let Err(e) = self.validated.unicast(Message::Validated(block.clone()), acc.id) {
                warn!("validated block delivery to {} failed: {}", acc.id, e);
            }
        }
        Ok(())
    }

    pub async fn process(&self, msg: Message) -> Result<(), Error> {
        match msg {
            Message::Approval(approval) => self.on_approval(approval).await,
            _ => Err(Error::UnexpectedEntity),
        }
    }
}
