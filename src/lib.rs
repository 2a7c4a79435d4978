//! Bilateral account consensus
//!
//! A two-party off-chain state machine for payment-channel-like ledgers.
//! Two parties (the ordered "left"/"right" entities of an account) maintain
//! a hash-chained sequence of account frames that atomically apply batches
//! of account transactions, converge on shared bilateral state, and produce
//! signed dispute proofs anchored to an external jurisdiction chain.
//!
//! # Example
//!
//! ```rust,ignore
//! use account_consensus::{proposer, receiver, testutil};
//!
//! let (mut left, mut right) = testutil::genesis_pair();
//! let env = testutil::fixed_env(0);
//! left.mempool.push_back(testutil::payment_tx(1, 1000));
//!
//! let proposal = proposer::propose(&mut left, &env, false, None).await?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod delta;
pub mod dispute;
pub mod env;
pub mod error;
pub mod exec;
pub mod frame;
pub mod ids;
pub mod jevents;
pub mod machine;
pub mod proposer;
pub mod receiver;
pub mod testutil;
pub mod tx;
pub mod wire;

pub use config::ConsensusConfig;
pub use delta::{BilateralFields, Delta};
pub use dispute::ProofBody;
pub use env::{
    AccountTxHandler, Clock, DepositoryAddressProvider, DisputeProofBuilder, Env, HankoVerifier,
    SigningOracle, TxExecCtx, TxOutcome,
};
pub use error::{ConsensusError, FatalError, SigningError};
pub use frame::{compute_frame_hash, Frame};
pub use ids::{Address, EntityId, Hanko, Hash};
pub use machine::{AccountMachine, FinalizedJEvent, JObservation, ProofHeader};
pub use tx::{AccountTx, JEvent, JEventClaim, OpaqueTx};
pub use wire::{AccountInput, ConsensusEvent, HandleOk, Proposal};
