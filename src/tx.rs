//! Account transactions.
//!
//! The concrete transaction set (payment, HTLC, swap, settle) is handled by
//! an external [`crate::env::AccountTxHandler`] (spec §1, §6) — the core
//! stays agnostic of their semantics. The one variant the core inspects
//! directly is `JEventClaim`, which feeds the bilateral J-event finalizer
//! (C7, spec §4.7).

use serde::{Deserialize, Serialize};

use crate::ids::Hash;
use ethnum::I256;

/// A single observed jurisdiction event to apply once 2-of-2 finalized.
///
/// The spec names `AccountSettled` as the expected (and only) event shape
/// this core reasons about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JEvent {
    pub token_id: u32,
    pub collateral: I256,
    pub ondelta: I256,
}

/// A claim that a jurisdiction block has been observed, carrying the
/// counterparty's view of the events in it (spec §4.7).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JEventClaim {
    pub j_height: u64,
    pub j_block_hash: Hash,
    pub events: Vec<JEvent>,
}

/// An opaque transaction handled entirely by the external tx-type handler.
///
/// `data` is the canonically pre-encoded payload (produced by the handler
/// layer) so frame hashing never needs to understand tx-specific shapes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueTx {
    pub tx_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Discriminated account transaction (spec §3: `{ type, data }`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountTx {
    JEventClaim(JEventClaim),
    Opaque(OpaqueTx),
}

impl AccountTx {
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::JEventClaim(_) => "j_event_claim",
            Self::Opaque(o) => &o.tx_type,
        }
    }

    #[must_use]
    pub fn as_j_event_claim(&self) -> Option<&JEventClaim> {
        match self {
            Self::JEventClaim(c) => Some(c),
            Self::Opaque(_) => None,
        }
    }

    #[must_use]
    pub fn is_j_event_claim(&self) -> bool {
        matches!(self, Self::JEventClaim(_))
    }
}
