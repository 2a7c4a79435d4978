//! Bilateral J-event finalizer (C7, spec §4.7).
//!
//! Per-account, not per-entity: each side accumulates its own observations
//! keyed by perspective (`left_j_observations`/`right_j_observations`). A
//! `(jHeight, jBlockHash)` pair finalizes once both buckets agree on it,
//! enforcing I9 — collateral/ondelta stay untouched until that 2-of-2 match.

use crate::env::Env;
use crate::machine::{AccountMachine, FinalizedJEvent};

/// Runs the 2-of-2 match and applies any newly-finalized events. Returns the
/// events finalized by this call (empty if nothing matched), for the caller
/// to fold into its diagnostic event log.
pub fn finalize_j_events(acct: &mut AccountMachine, env: &Env) -> Vec<FinalizedJEvent> {
    let mut ready = Vec::new();
    for left in &acct.left_j_observations {
        let already = acct
            .j_event_chain
            .iter()
            .any(|f| f.j_height == left.j_height && f.j_block_hash == left.j_block_hash);
        if already {
            continue;
        }
        if let Some(right) = acct
            .right_j_observations
            .iter()
            .find(|r| r.j_height == left.j_height && r.j_block_hash == left.j_block_hash)
        {
            ready.push((left.j_height, left.j_block_hash, right.events.clone()));
        }
    }

    let mut finalized = Vec::with_capacity(ready.len());
    for (j_height, j_block_hash, events) in ready {
        for event in &events {
            let delta = acct
                .deltas
                .entry(event.token_id)
                .or_insert_with(|| crate::delta::Delta::zero(event.token_id));
            delta.collateral = event.collateral;
            delta.ondelta = event.ondelta;
        }

        let record = FinalizedJEvent {
            j_height,
            j_block_hash,
            events,
            finalized_at: env.now(),
        };
        acct.j_event_chain.push(record.clone());
        if j_height > acct.last_finalized_j_height {
            acct.last_finalized_j_height = j_height;
        }

        acct.left_j_observations
            .retain(|o| !(o.j_height == j_height && o.j_block_hash == j_block_hash));
        acct.right_j_observations
            .retain(|o| !(o.j_height == j_height && o.j_block_hash == j_block_hash));

        tracing::info!(j_height, "finalized j-event");
        finalized.push(record);
    }
    finalized
}
