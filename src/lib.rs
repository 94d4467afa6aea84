//! Round-based consensus core: deterministic proposer/validator sampling
//! over a stake-weighted account set, protocol-rule validation, and the
//! single-proposer / threshold-approval round machine.

pub mod id;
pub mod account;
pub mod state;
pub mod assign;
pub mod txn;
pub mod block;
pub mod validate;
pub mod store;
pub mod network;
pub mod propose;
pub mod approve;

/// Accounts below this stake are invisible to the assigner.
pub const MINIMUM_STAKE: u32 = 1024;

/// Distinct validator approvals needed to finalize a block.
pub const VALIDATOR_THRESHOLD: u16 = 10;

/// Distinct validator certificates needed on a single transaction.
pub const SIGNATURE_THRESHOLD: u16 = 3;

pub const MIN_TRANSACTIONS_NUM: usize = 4;
pub const MAX_TRANSACTIONS_NUM: usize = 128;

// Pool wait: exponential backoff, capped, bounded number of polls.
pub const POOL_BACKOFF_MS: u64 = 25;
pub const POOL_BACKOFF_CAP_MS: u64 = 200;
pub const POOL_RETRIES: u32 = 8;
