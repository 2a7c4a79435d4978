//! Wire message shapes (spec §6) and diagnostic events (spec §6, §4.4).

use serde::{Deserialize, Serialize};

use crate::error::ConsensusError;
use crate::frame::Frame;
use crate::ids::{EntityId, Hanko, Hash};
use crate::tx::AccountTx;

/// What C2 hands back to the caller to send to the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub frame: Frame,
    pub frame_hanko: Hanko,
    pub dispute_hanko: Hanko,
    pub dispute_proof_body_hash: Hash,
    pub nonce: u64,
    /// HTLC-lock txs that failed validation and were dropped from the
    /// mempool, for upstream backward cancellation (spec §4.2 step 4).
    pub failed_htlc_locks: Vec<AccountTx>,
}

/// The minimal envelope on the wire (spec §6: `AccountInput`). A message is
/// a proposal, an ACK, or a batched ACK+proposal depending on which
/// optional fields are populated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInput {
    pub from_entity: EntityId,
    pub to_entity: EntityId,
    pub height: Option<u64>,
    pub new_account_frame: Option<Frame>,
    pub new_hanko: Option<Hanko>,
    pub prev_hanko: Option<Hanko>,
    pub new_dispute_hanko: Option<Hanko>,
    pub new_dispute_hash: Option<Hash>,
    pub new_dispute_proof_body_hash: Option<Hash>,
    pub dispute_proof_nonce: Option<u64>,
    pub new_settlement_hanko: Option<Hanko>,
}

impl AccountInput {
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.prev_hanko.is_some()
    }

    #[must_use]
    pub fn is_proposal(&self) -> bool {
        self.new_account_frame.is_some()
    }

    /// Encodes this envelope to CBOR for transport (spec §6).
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::FrameEncodingInvalid` if CBOR encoding
    /// fails (only possible on allocation failure).
    pub fn to_cbor(&self) -> Result<Vec<u8>, ConsensusError> {
        cbor4ii::serde::to_vec(Vec::new(), self).map_err(|_| ConsensusError::FrameEncodingInvalid)
    }

    /// Decodes an envelope previously produced by [`Self::to_cbor`].
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidFrameStructure` if `bytes` is not a
    /// well-formed CBOR encoding of `AccountInput`.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ConsensusError> {
        cbor4ii::serde::from_slice(bytes)
            .map_err(|e| ConsensusError::InvalidFrameStructure(e.to_string()))
    }
}

/// Diagnostic events emitted by the core (spec §6, §4.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusEvent {
    BilateralFrameCommitted {
        from_entity: EntityId,
        to_entity: EntityId,
        height: u64,
        tx_count: usize,
        token_ids: Vec<u32>,
        state_hash: Hash,
    },
    /// Left ignored an incoming frame at a colliding height (spec §4.4).
    LeftWins { ignored_frame_hash: Hash },
    /// Right rolled back its pending frame in favor of left's (spec §4.4).
    Rollback { winning_frame_hash: Hash },
}

/// Result of a successful [`crate::receiver::handle_input`] call.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct HandleOk {
    pub events: Vec<ConsensusEvent>,
    /// An ACK (possibly batched with a chained proposal) to send back.
    pub outbound: Option<AccountInput>,
}
