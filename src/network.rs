use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use crate::block::{Approval, Proposal, TxnApproval, ValidatedBlock};
use crate::id::Id;
use crate::txn::Txn;

/// Named channels of the consensus core. Proposal traffic and
/// finalized-block traffic stay logically separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    ProposedBlocks,
    ValidatedBlocks,
    Transactions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Message {
    Proposal(Proposal),
    Approval(Approval),
    Validated(ValidatedBlock),
    Txn(Txn),
    TxnApproval(TxnApproval),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("{1:?} already registered for {0}")]
    ChannelTaken(Id, Channel),
    #[error("no {1:?} registration for {0}")]
    UnknownTarget(Id, Channel),
}

/// The transport seam. Sends are queue-and-return: a slow network must
/// not block an engine that is holding its round state.
pub trait Conduit: Send + Sync {
    fn unicast(&self, msg: Message, to: Id) -> Result<(), Error>;
}

/// In-memory conduit for tests and single-process wiring: one mailbox
/// per (node, channel) registration.
#[derive(Default)]
pub struct Hub {
    mailboxes: Mutex<HashMap<(Id, Channel), VecDeque<Message>>>,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim a channel for a node. Each (node, channel) pair has one
    /// owner.
    pub fn register(self: &Arc<Self>, node: Id, channel: Channel) -> Result<Handle, Error> {
        let mut mailboxes = self.mailboxes.lock();
        if mailboxes.contains_key(&(node, channel)) {
            return Err(Error::ChannelTaken(node, channel));
        }
        mailboxes.insert((node, channel), VecDeque::new());
        Ok(Handle { hub: Arc::clone(self), channel })
    }

    pub fn drain(&self, node: Id, channel: Channel) -> Vec<Message> {
        let mut mailboxes = self.mailboxes.lock();
        match mailboxes.get_mut(&(node, channel)) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }
}

/// A node's sending end on one channel.
#[derive(Clone)]
pub struct Handle {
    hub: Arc<Hub>,
    channel: Channel,
}

impl Conduit for Handle {
    fn unicast(&self, msg: Message, to: Id) -> Result<(), Error> {
        let mut mailboxes = self.hub.mailboxes.lock();
        match mailboxes.get_mut(&(to, self.channel)) {
            Some(queue) => {
                queue.push_back(msg);
                Ok(())
            }
            None => Err(Error::UnknownTarget(to, self.channel)),
        }
    }
}
