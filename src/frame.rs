//! Frame builder & hasher (C1, spec §4.1).
//!
//! Implements the single canonical encoding the spec mandates: a
//! deterministic JSON-equivalent structure with ascending numeric keys and
//! decimal-string big integers, hashed with keccak-256. Spec §9 explicitly
//! rejects any legacy variant (with/without `stateHash`, with/without
//! `byLeft`) observed on the wire — this encoder is the only one that
//! exists in this crate.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::delta::Delta;
use crate::ids::Hash;
use crate::tx::AccountTx;

/// A committed (or about-to-be-committed) batch of account transactions,
/// hash-chained to the previous frame (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub height: u64,
    pub timestamp: i64,
    pub j_height: u64,
    /// `None` encodes the literal `"genesis"` sentinel at height 1.
    pub prev_frame_hash: Option<Hash>,
    pub account_txs: Vec<AccountTx>,
    pub token_ids: Vec<u32>,
    pub deltas: Vec<ethnum::I256>,
    pub full_delta_states: Vec<Delta>,
    pub by_left: bool,
    pub state_hash: Hash,
}

/// Renders a value into the canonical JSON-equivalent encoding used for
/// hashing. Implemented by hand (spec §9) rather than via a JSON library,
/// so that key order and number formatting can never depend on library
/// internals or change across versions.
trait CanonicalEncode {
    fn encode_canonical(&self, out: &mut String);
}

impl CanonicalEncode for u64 {
    fn encode_canonical(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

impl CanonicalEncode for i64 {
    fn encode_canonical(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

impl CanonicalEncode for u32 {
    fn encode_canonical(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

impl CanonicalEncode for bool {
    fn encode_canonical(&self, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

impl CanonicalEncode for ethnum::I256 {
    fn encode_canonical(&self, out: &mut String) {
        // Decimal string, no leading zeroes — ethnum's Display already
        // matches this (e.g. "-1000", "0", "123").
        out.push('"');
        out.push_str(&self.to_string());
        out.push('"');
    }
}

fn encode_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

impl CanonicalEncode for Hash {
    fn encode_canonical(&self, out: &mut String) {
        encode_str(out, &format!("0x{}", hex::encode(self.0)));
    }
}

fn encode_prev_frame_hash(prev: Option<&Hash>, out: &mut String) {
    match prev {
        None => encode_str(out, "genesis"),
        Some(h) => h.encode_canonical(out),
    }
}

fn encode_array<T: CanonicalEncode>(items: &[T], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        item.encode_canonical(out);
    }
    out.push(']');
}

impl CanonicalEncode for Delta {
    fn encode_canonical(&self, out: &mut String) {
        out.push('{');
        out.push_str("\"tokenId\":");
        self.token_id.encode_canonical(out);
        out.push_str(",\"collateral\":");
        self.collateral.encode_canonical(out);
        out.push_str(",\"ondelta\":");
        self.ondelta.encode_canonical(out);
        out.push_str(",\"offdelta\":");
        self.offdelta.encode_canonical(out);
        out.push_str(",\"leftCreditLimit\":");
        self.left_credit_limit.encode_canonical(out);
        out.push_str(",\"rightCreditLimit\":");
        self.right_credit_limit.encode_canonical(out);
        out.push_str(",\"leftAllowance\":");
        self.left_allowance.encode_canonical(out);
        out.push_str(",\"rightAllowance\":");
        self.right_allowance.encode_canonical(out);
        out.push_str(",\"leftHtlcHold\":");
        self.left_htlc_hold.encode_canonical(out);
        out.push_str(",\"rightHtlcHold\":");
        self.right_htlc_hold.encode_canonical(out);
        out.push_str(",\"leftSwapHold\":");
        self.left_swap_hold.encode_canonical(out);
        out.push_str(",\"rightSwapHold\":");
        self.right_swap_hold.encode_canonical(out);
        out.push_str(",\"leftSettleHold\":");
        self.left_settle_hold.encode_canonical(out);
        out.push_str(",\"rightSettleHold\":");
        self.right_settle_hold.encode_canonical(out);
        out.push('}');
    }
}

impl CanonicalEncode for AccountTx {
    fn encode_canonical(&self, out: &mut String) {
        out.push('{');
        out.push_str("\"type\":");
        encode_str(out, self.type_name());
        out.push_str(",\"data\":");
        match self {
            AccountTx::JEventClaim(c) => {
                out.push('{');
                out.push_str("\"jHeight\":");
                c.j_height.encode_canonical(out);
                out.push_str(",\"jBlockHash\":");
                c.j_block_hash.encode_canonical(out);
                out.push_str(",\"events\":[");
                for (i, e) in c.events.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('{');
                    out.push_str("\"tokenId\":");
                    e.token_id.encode_canonical(out);
                    out.push_str(",\"collateral\":");
                    e.collateral.encode_canonical(out);
                    out.push_str(",\"ondelta\":");
                    e.ondelta.encode_canonical(out);
                    out.push('}');
                }
                out.push(']');
                out.push('}');
            }
            AccountTx::Opaque(o) => {
                encode_str(out, &hex::encode(&o.data));
            }
        }
        out.push('}');
    }
}

impl CanonicalEncode for Frame {
    fn encode_canonical(&self, out: &mut String) {
        out.push('{');
        out.push_str("\"height\":");
        self.height.encode_canonical(out);
        out.push_str(",\"timestamp\":");
        self.timestamp.encode_canonical(out);
        out.push_str(",\"jHeight\":");
        self.j_height.encode_canonical(out);
        out.push_str(",\"prevFrameHash\":");
        encode_prev_frame_hash(self.prev_frame_hash.as_ref(), out);
        out.push_str(",\"accountTxs\":");
        encode_array(&self.account_txs, out);
        out.push_str(",\"tokenIds\":");
        encode_array(&self.token_ids, out);
        out.push_str(",\"deltas\":");
        encode_array(&self.deltas, out);
        out.push_str(",\"fullDeltaStates\":");
        encode_array(&self.full_delta_states, out);
        out.push_str(",\"byLeft\":");
        self.by_left.encode_canonical(out);
        out.push('}');
    }
}

impl Frame {
    /// Canonical UTF-8 bytes hashed to produce `stateHash` (spec §4.1).
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut s = String::with_capacity(256 + self.account_txs.len() * 64);
        self.encode_canonical(&mut s);
        s.into_bytes()
    }
}

/// C1: pure, deterministic frame hash.
#[must_use]
pub fn compute_frame_hash(frame: &Frame) -> Hash {
    let bytes = frame.canonical_bytes();
    let digest = Keccak256::digest(&bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethnum::I256;

    fn sample_frame() -> Frame {
        let delta = Delta {
            token_id: 1,
            ..Delta::zero(1)
        };
        let mut d = delta;
        d.offdelta = I256::from(1000i64);
        Frame {
            height: 1,
            timestamp: 42,
            j_height: 0,
            prev_frame_hash: None,
            account_txs: vec![],
            token_ids: vec![1],
            deltas: vec![I256::from(1000i64)],
            full_delta_states: vec![d],
            by_left: true,
            state_hash: Hash([0u8; 32]),
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let f = sample_frame();
        let h1 = compute_frame_hash(&f);
        let h2 = compute_frame_hash(&f);
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_changes_with_content() {
        let mut f = sample_frame();
        let h1 = compute_frame_hash(&f);
        f.height = 2;
        let h2 = compute_frame_hash(&f);
        assert_ne!(h1, h2);
    }

    #[test]
    fn genesis_prev_hash_encodes_as_literal() {
        let f = sample_frame();
        let bytes = f.canonical_bytes();
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("\"prevFrameHash\":\"genesis\""));
    }

    #[test]
    fn excludes_state_hash_field_itself() {
        let f = sample_frame();
        let bytes = f.canonical_bytes();
        let s = String::from_utf8(bytes).unwrap();
        assert!(!s.contains("stateHash"));
    }
}
