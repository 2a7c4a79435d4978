//! Dispute proof binding (C8, spec §4.8).
//!
//! A dispute proof is `(proofBodyHash, nonce, depositoryAddress)`, bound by
//! a second keccak-256 digest (`disputeHash`) that also folds in the
//! account's canonical identifiers so a proof cannot be replayed against a
//! different account or jurisdiction. Binding lives on the external
//! [`crate::env::DisputeProofBuilder`] alongside proof-body construction
//! (spec §6) — the core only ever calls through the injected builder.

use crate::ids::Hash;

/// ABI-encodable snapshot of account state, produced by the external
/// [`crate::env::DisputeProofBuilder`] (spec §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofBody {
    pub proof_body_hash: Hash,
    /// Opaque ABI-encoded bytes; the core never decodes these, only binds
    /// and signs over their hash.
    pub encoded: Vec<u8>,
}
