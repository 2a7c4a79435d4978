//! The `AccountMachine` aggregate (spec §3).
//!
//! Each party holds its own `AccountMachine` for the ordered pair
//! (left, right) of entities. All mutation happens through
//! [`crate::proposer::propose`] and [`crate::receiver::handle_input`]; the
//! struct itself is a plain data aggregate, the way the teacher's
//! `TwoGenerals` held all protocol state directly on one struct rather than
//! splitting it across services.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::config::ConsensusConfig;
use crate::delta::Delta;
use crate::dispute::ProofBody;
use crate::error::FatalError;
use crate::frame::Frame;
use crate::ids::{EntityId, Hanko, Hash};
use crate::tx::{AccountTx, JEvent};

/// Replay-protection header, shared in spirit with the frame chain but
/// tracking the outbound message sequence rather than frame height (spec
/// §3, §9: a single `nonce`, not the source's separate `counter`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofHeader {
    pub from_entity: EntityId,
    pub to_entity: EntityId,
    pub nonce: u64,
    pub dispute_nonce: u64,
}

/// One party's observation of a jurisdiction block (spec §4.7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JObservation {
    pub j_height: u64,
    pub j_block_hash: Hash,
    pub events: Vec<JEvent>,
}

/// A jurisdiction event pair after both sides' observations matched and it
/// was applied to shared state (spec §4.7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedJEvent {
    pub j_height: u64,
    pub j_block_hash: Hash,
    pub events: Vec<JEvent>,
    pub finalized_at: i64,
}

/// The bilateral account consensus state machine for one party's view of
/// the (left, right) pair.
#[derive(Clone)]
pub struct AccountMachine {
    pub left_entity: EntityId,
    pub right_entity: EntityId,
    /// Which side this instance's owner is.
    pub self_entity: EntityId,

    pub proof_header: ProofHeader,

    pub current_height: u64,
    /// `None` at genesis (height 0); `Some` once a frame has committed.
    pub current_frame: Option<Frame>,
    pub frame_history: VecDeque<Frame>,

    pub deltas: BTreeMap<u32, Delta>,
    pub mempool: VecDeque<AccountTx>,

    pub pending_frame: Option<Frame>,

    pub counterparty_frame_hanko: Option<Hanko>,
    pub counterparty_dispute_proof_hanko: Option<Hanko>,
    pub counterparty_dispute_proof_body_hash: Option<Hash>,
    pub counterparty_dispute_proof_nonce: Option<u64>,

    pub current_dispute_proof_hanko: Option<Hanko>,
    pub current_dispute_proof_body_hash: Option<Hash>,
    pub current_dispute_proof_nonce: Option<u64>,

    pub dispute_proof_nonces_by_hash: HashMap<Hash, u64>,
    pub dispute_proof_bodies_by_hash: HashMap<Hash, ProofBody>,

    pub rollback_count: u32,
    pub last_rollback_frame_hash: Option<Hash>,

    pub left_j_observations: Vec<JObservation>,
    pub right_j_observations: Vec<JObservation>,
    pub j_event_chain: Vec<FinalizedJEvent>,
    pub last_finalized_j_height: u64,

    /// Opaque per-lock state, owned and interpreted only by the external
    /// tx handler (spec §3: "consumed by external tx handlers").
    pub locks: HashMap<u64, Vec<u8>>,
    /// Opaque per-offer state, same ownership model as `locks`.
    pub swap_offers: HashMap<u64, Vec<u8>>,

    pub config: ConsensusConfig,

    /// Set once a [`FatalError`] has been raised; refuses further
    /// `propose`/`handle_input` calls until externally reset (spec §7).
    pub halted: Option<FatalError>,
}

impl AccountMachine {
    /// A fresh account at genesis: height 0, empty deltas and history.
    #[must_use]
    pub fn genesis(self_entity: EntityId, left: EntityId, right: EntityId) -> Self {
        Self::genesis_with_config(self_entity, left, right, ConsensusConfig::default())
    }

    /// # Panics
    ///
    /// Panics if `left >= right` — entity ordering assigns the left/right
    /// roles and must be established before genesis.
    #[must_use]
    pub fn genesis_with_config(
        self_entity: EntityId,
        left: EntityId,
        right: EntityId,
        config: ConsensusConfig,
    ) -> Self {
        assert!(left < right, "left must be lexicographically smaller than right");
        assert!(
            self_entity == left || self_entity == right,
            "self_entity must be one of the account's two sides"
        );
        let other = if self_entity == left { right } else { left };
        Self {
            left_entity: left,
            right_entity: right,
            self_entity,
            proof_header: ProofHeader {
                from_entity: self_entity,
                to_entity: other,
                nonce: 0,
                dispute_nonce: 0,
            },
            current_height: 0,
            current_frame: None,
            frame_history: VecDeque::with_capacity(config.max_frame_history),
            deltas: BTreeMap::new(),
            mempool: VecDeque::new(),
            pending_frame: None,
            counterparty_frame_hanko: None,
            counterparty_dispute_proof_hanko: None,
            counterparty_dispute_proof_body_hash: None,
            counterparty_dispute_proof_nonce: None,
            current_dispute_proof_hanko: None,
            current_dispute_proof_body_hash: None,
            current_dispute_proof_nonce: None,
            dispute_proof_nonces_by_hash: HashMap::new(),
            dispute_proof_bodies_by_hash: HashMap::new(),
            rollback_count: 0,
            last_rollback_frame_hash: None,
            left_j_observations: Vec::new(),
            right_j_observations: Vec::new(),
            j_event_chain: Vec::new(),
            last_finalized_j_height: 0,
            locks: HashMap::new(),
            swap_offers: HashMap::new(),
            config,
            halted: None,
        }
    }

    #[must_use]
    pub fn is_left(&self) -> bool {
        self.self_entity == self.left_entity
    }

    #[must_use]
    pub fn counterparty(&self) -> EntityId {
        if self.is_left() {
            self.right_entity
        } else {
            self.left_entity
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Operator action: clears a halted account so it can resume processing
    /// (spec §7: fatal errors "require external reset or dispute initiation").
    pub fn reset_halt(&mut self) {
        self.halted = None;
    }

    pub(crate) fn push_history(&mut self, frame: Frame) {
        if self.frame_history.len() == self.config.max_frame_history {
            self.frame_history.pop_front();
        }
        self.frame_history.push_back(frame);
    }

    /// The hash a new frame must chain from: `None` encodes genesis.
    #[must_use]
    pub fn head_hash(&self) -> Option<Hash> {
        self.current_frame.as_ref().map(|f| f.state_hash)
    }
}
