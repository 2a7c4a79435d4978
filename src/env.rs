//! External collaborator interfaces (spec §6).
//!
//! The core never implements a concrete signing scheme, tx-type dispatch,
//! or jurisdiction chain client — it only calls through these traits. An
//! [`Env`] bundles one implementation of each plus a [`Clock`], mirroring
//! how the teacher's `TwoGenerals` held a concrete `KeyPair`/`PublicKey`
//! pair, generalized to injected capabilities since this spec must stay
//! agnostic of the signing scheme and tx semantics (spec §9).

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispute::ProofBody;
use crate::error::{ConsensusError, SigningError};
use crate::ids::{Address, EntityId, Hanko, Hash};
use crate::machine::AccountMachine;
use crate::tx::AccountTx;

/// Produces hankos (entity-quorum signatures) over digests.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    async fn sign_hashes_as_single_entity(
        &self,
        entity: EntityId,
        signer: EntityId,
        hashes: &[Hash],
    ) -> Result<Vec<Hanko>, SigningError>;
}

/// Verifies a hanko recovers to the expected entity over a digest.
#[async_trait]
pub trait HankoVerifier: Send + Sync {
    async fn verify_hanko_for_hash(
        &self,
        hanko: &Hanko,
        hash: Hash,
        expected_entity: EntityId,
    ) -> Result<bool, SigningError>;
}

/// Execution context passed to the tx handler (spec §6).
#[derive(Clone, Copy, Debug)]
pub struct TxExecCtx {
    pub by_left: bool,
    pub timestamp: i64,
    pub j_height: u64,
    pub is_validation: bool,
}

/// Result of executing a single account transaction (spec §6).
#[derive(Clone, Debug, Default)]
pub struct TxOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub events: Vec<String>,
}

impl TxOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            events: Vec::new(),
        }
    }
}

/// Dispatches the concrete per-variant transaction logic (payment, HTLC,
/// swap, settle). Deterministic; MUST NOT mutate `collateral`/`ondelta` for
/// any tx other than `j_event_claim` — the core asserts this via the
/// settlement-vector guard (spec §6, invariant checked in
/// [`crate::proposer`]/[`crate::receiver`]).
#[async_trait]
pub trait AccountTxHandler: Send + Sync {
    async fn process_account_tx(
        &self,
        acct: &mut AccountMachine,
        tx: &AccountTx,
        ctx: TxExecCtx,
    ) -> TxOutcome;
}

/// Supplies the active jurisdiction's depository address, used as a domain
/// separator in the dispute hash. Spec §9 eliminates the source's
/// fallback-to-zero-address path: failure is surfaced eagerly.
#[async_trait]
pub trait DepositoryAddressProvider: Send + Sync {
    async fn depository_address(&self) -> Result<Address, ConsensusError>;
}

/// Builds the ABI-encoded proof body snapshot of account state and binds it
/// to a dispute hash (spec §6).
pub trait DisputeProofBuilder: Send + Sync {
    fn build_account_proof_body(&self, acct: &AccountMachine) -> ProofBody;

    /// Binds a proof body to a depository address and the account's
    /// canonical (left, right) identifiers. This is the hash the dispute
    /// hanko signs.
    fn create_dispute_proof_hash(
        &self,
        proof_body_hash: Hash,
        depository: Address,
        left: EntityId,
        right: EntityId,
    ) -> Hash;
}

/// Injectable wall clock, so tests can drive deterministic timestamps.
pub trait Clock: Send + Sync {
    /// Current time, Unix seconds.
    fn now(&self) -> i64;
}

/// The bundle of external capabilities `propose`/`handle_input` need.
#[derive(Clone)]
pub struct Env {
    pub signing_oracle: Arc<dyn SigningOracle>,
    pub hanko_verifier: Arc<dyn HankoVerifier>,
    pub tx_handler: Arc<dyn AccountTxHandler>,
    pub depository: Arc<dyn DepositoryAddressProvider>,
    pub dispute_builder: Arc<dyn DisputeProofBuilder>,
    pub clock: Arc<dyn Clock>,
}

impl Env {
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}
