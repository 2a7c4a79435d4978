//! In-memory stub adapters for the external collaborator traits (spec §6).
//!
//! Mirrors the teacher's `KeyPair`/`Signer`/`Verifier` pair, generalized: a
//! signing key is derived deterministically from the entity id rather than
//! generated and stored in a keyring, so unit and integration tests never
//! need to thread key material around — only entity ids.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _};
use ethnum::I256;
use sha3::{Digest, Keccak256};

use crate::delta::Delta;
use crate::dispute::ProofBody;
use crate::env::{
    AccountTxHandler, Clock, DepositoryAddressProvider, DisputeProofBuilder, Env, HankoVerifier,
    SigningOracle, TxExecCtx, TxOutcome,
};
use crate::error::{ConsensusError, SigningError};
use crate::ids::{Address, EntityId, Hanko, Hash};
use crate::machine::AccountMachine;
use crate::tx::AccountTx;

fn derive_signing_key(signer: EntityId) -> SigningKey {
    let mut hasher = Keccak256::new();
    hasher.update(b"account-consensus/test-signing-key");
    hasher.update(signer.as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    SigningKey::from_bytes(&seed)
}

/// Deterministic ed25519 signer/verifier pair, keyed off entity id alone.
pub struct TestOracle;

#[async_trait]
impl SigningOracle for TestOracle {
    async fn sign_hashes_as_single_entity(
        &self,
        _entity: EntityId,
        signer: EntityId,
        hashes: &[Hash],
    ) -> Result<Vec<Hanko>, SigningError> {
        let key = derive_signing_key(signer);
        Ok(hashes
            .iter()
            .map(|h| Hanko(key.sign(h.as_bytes()).to_bytes().to_vec()))
            .collect())
    }
}

#[async_trait]
impl HankoVerifier for TestOracle {
    async fn verify_hanko_for_hash(
        &self,
        hanko: &Hanko,
        hash: Hash,
        expected_entity: EntityId,
    ) -> Result<bool, SigningError> {
        let key = derive_signing_key(expected_entity);
        let verifying = key.verifying_key();
        let bytes: [u8; 64] = hanko
            .0
            .clone()
            .try_into()
            .map_err(|_| SigningError::VerificationFailed)?;
        let sig = Signature::from_bytes(&bytes);
        Ok(verifying.verify(hash.as_bytes(), &sig).is_ok())
    }
}

/// Handles a single opaque tx type, `"payment"`: adjusts `offdelta` within
/// credit limits. `j_event_claim` is a no-op here — the core itself records
/// the claim into the observation buckets after commit (spec §4.7).
pub struct TestTxHandler;

#[async_trait]
impl AccountTxHandler for TestTxHandler {
    async fn process_account_tx(
        &self,
        acct: &mut AccountMachine,
        tx: &AccountTx,
        ctx: TxExecCtx,
    ) -> TxOutcome {
        match tx {
            AccountTx::JEventClaim(_) => TxOutcome::ok(),
            AccountTx::Opaque(o) if o.tx_type == "payment" => {
                if o.data.len() != 20 {
                    return TxOutcome::fail("malformed payment data");
                }
                let mut token_bytes = [0u8; 4];
                token_bytes.copy_from_slice(&o.data[0..4]);
                let token_id = u32::from_be_bytes(token_bytes);
                let mut amount_bytes = [0u8; 16];
                amount_bytes.copy_from_slice(&o.data[4..20]);
                let amount = I256::from(i128::from_be_bytes(amount_bytes));

                let delta = acct
                    .deltas
                    .entry(token_id)
                    .or_insert_with(|| Delta::zero(token_id));
                let new_offdelta = if ctx.by_left {
                    delta.offdelta + amount
                } else {
                    delta.offdelta - amount
                };
                if new_offdelta > delta.left_credit_limit || new_offdelta < -delta.right_credit_limit {
                    return TxOutcome::fail("payment exceeds credit limit");
                }
                delta.offdelta = new_offdelta;
                TxOutcome::ok()
            }
            AccountTx::Opaque(o) => TxOutcome::fail(format!("unknown tx type: {}", o.tx_type)),
        }
    }
}

/// A payment tx payload: 4-byte big-endian `tokenId`, 16-byte big-endian
/// signed `amount`.
#[must_use]
pub fn payment_tx(token_id: u32, amount: i128) -> AccountTx {
    let mut data = Vec::with_capacity(20);
    data.extend_from_slice(&token_id.to_be_bytes());
    data.extend_from_slice(&amount.to_be_bytes());
    AccountTx::Opaque(crate::tx::OpaqueTx {
        tx_type: "payment".into(),
        data,
    })
}

/// Sets credit limits directly, bypassing the tx pipeline — test fixture
/// setup only, never reachable from `propose`/`handle_input`.
pub fn seed_credit_limits(acct: &mut AccountMachine, token_id: u32, left: i128, right: i128) {
    let delta = acct
        .deltas
        .entry(token_id)
        .or_insert_with(|| Delta::zero(token_id));
    delta.left_credit_limit = I256::from(left);
    delta.right_credit_limit = I256::from(right);
}

/// A single fixed jurisdiction depository address.
pub struct FixedDepository(pub Address);

#[async_trait]
impl DepositoryAddressProvider for FixedDepository {
    async fn depository_address(&self) -> Result<Address, ConsensusError> {
        Ok(self.0)
    }
}

/// Builds a proof body by hashing a flat big-endian encoding of every delta.
pub struct TestDisputeBuilder;

impl DisputeProofBuilder for TestDisputeBuilder {
    fn build_account_proof_body(&self, acct: &AccountMachine) -> ProofBody {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&acct.current_height.to_be_bytes());
        for (token_id, delta) in &acct.deltas {
            bytes.extend_from_slice(&token_id.to_be_bytes());
            bytes.extend_from_slice(&delta.collateral.to_be_bytes());
            bytes.extend_from_slice(&delta.ondelta.to_be_bytes());
            bytes.extend_from_slice(&delta.offdelta.to_be_bytes());
        }
        let digest = Keccak256::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ProofBody {
            proof_body_hash: Hash(out),
            encoded: bytes,
        }
    }

    fn create_dispute_proof_hash(
        &self,
        proof_body_hash: Hash,
        depository: Address,
        left: EntityId,
        right: EntityId,
    ) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(proof_body_hash.as_bytes());
        hasher.update(depository.0);
        hasher.update(left.as_bytes());
        hasher.update(right.as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash(out)
    }
}

/// An atomically-advanceable clock, so tests can control timestamps exactly.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn advance(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// An `Env` wired entirely from the stubs above, starting the clock at `now`.
#[must_use]
pub fn fixed_env(now: i64) -> Env {
    let oracle = Arc::new(TestOracle);
    Env {
        signing_oracle: oracle.clone(),
        hanko_verifier: oracle,
        tx_handler: Arc::new(TestTxHandler),
        depository: Arc::new(FixedDepository(Address([0x11; 20]))),
        dispute_builder: Arc::new(TestDisputeBuilder),
        clock: Arc::new(FixedClock::new(now)),
    }
}

/// A genesis `(left, right)` pair of `AccountMachine`s for the same account.
#[must_use]
pub fn genesis_pair() -> (AccountMachine, AccountMachine) {
    let left = EntityId([0x01; 32]);
    let right = EntityId([0x02; 32]);
    (
        AccountMachine::genesis(left, left, right),
        AccountMachine::genesis(right, left, right),
    )
}
