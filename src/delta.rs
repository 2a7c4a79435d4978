//! Per-token ledger state (spec §3) and the bilateral/unilateral field split.

use ethnum::I256;
use serde::{Deserialize, Serialize};

/// One token's ledger state on an account.
///
/// Fields are partitioned into bilateral (B) — changed only by committed
/// frames, must match bit-for-bit between peers — and unilateral (U) —
/// changed only by 2-of-2 finalized J-events, may lag transiently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub token_id: u32,

    // Unilateral (U)
    pub collateral: I256,
    pub ondelta: I256,

    // Bilateral (B)
    pub offdelta: I256,
    pub left_credit_limit: I256,
    pub right_credit_limit: I256,
    pub left_allowance: I256,
    pub right_allowance: I256,
    pub left_htlc_hold: I256,
    pub right_htlc_hold: I256,
    pub left_swap_hold: I256,
    pub right_swap_hold: I256,
    pub left_settle_hold: I256,
    pub right_settle_hold: I256,
}

impl Delta {
    /// A fresh delta for `token_id` with every field at zero.
    #[must_use]
    pub fn zero(token_id: u32) -> Self {
        Self {
            token_id,
            collateral: I256::ZERO,
            ondelta: I256::ZERO,
            offdelta: I256::ZERO,
            left_credit_limit: I256::ZERO,
            right_credit_limit: I256::ZERO,
            left_allowance: I256::ZERO,
            right_allowance: I256::ZERO,
            left_htlc_hold: I256::ZERO,
            right_htlc_hold: I256::ZERO,
            left_swap_hold: I256::ZERO,
            right_swap_hold: I256::ZERO,
            left_settle_hold: I256::ZERO,
            right_settle_hold: I256::ZERO,
        }
    }

    /// Invariant I5: a token belongs in a frame's `tokenIds` iff it has a
    /// non-zero bilateral footprint. Collateral/ondelta alone never qualify.
    #[must_use]
    pub fn has_bilateral_footprint(&self) -> bool {
        self.offdelta != I256::ZERO
            || self.left_credit_limit != I256::ZERO
            || self.right_credit_limit != I256::ZERO
            || self.left_allowance != I256::ZERO
            || self.right_allowance != I256::ZERO
            || self.left_htlc_hold != I256::ZERO
            || self.right_htlc_hold != I256::ZERO
            || self.left_swap_hold != I256::ZERO
            || self.right_swap_hold != I256::ZERO
            || self.left_settle_hold != I256::ZERO
            || self.right_settle_hold != I256::ZERO
    }

    /// The bilateral-field projection (B), compared for exact equality
    /// between peers after every committed frame (invariant I4) and used to
    /// detect injection attempts (spec §4.3 step 7 / S3).
    #[must_use]
    pub fn bilateral_projection(&self) -> BilateralFields {
        BilateralFields {
            offdelta: self.offdelta,
            left_credit_limit: self.left_credit_limit,
            right_credit_limit: self.right_credit_limit,
            left_allowance: self.left_allowance,
            right_allowance: self.right_allowance,
            left_htlc_hold: self.left_htlc_hold,
            right_htlc_hold: self.right_htlc_hold,
            left_swap_hold: self.left_swap_hold,
            right_swap_hold: self.right_swap_hold,
            left_settle_hold: self.left_settle_hold,
            right_settle_hold: self.right_settle_hold,
        }
    }

    /// The unilateral-field projection (U), used by the settlement-vector
    /// guard to assert no non-`j_event_claim` tx mutated collateral/ondelta.
    #[must_use]
    pub fn unilateral_projection(&self) -> (I256, I256) {
        (self.collateral, self.ondelta)
    }
}

/// The bilateral (B) subset of a [`Delta`], compared for exact equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BilateralFields {
    pub offdelta: I256,
    pub left_credit_limit: I256,
    pub right_credit_limit: I256,
    pub left_allowance: I256,
    pub right_allowance: I256,
    pub left_htlc_hold: I256,
    pub right_htlc_hold: I256,
    pub left_swap_hold: I256,
    pub right_swap_hold: I256,
    pub left_settle_hold: I256,
    pub right_settle_hold: I256,
}
