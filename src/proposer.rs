//! Proposer (C2, spec §4.2).
//!
//! Drains the mempool onto a clone, filters invalid txs, emits a signed
//! proposal and dispute proof. No real account state is mutated until
//! signing succeeds — a failure at any earlier step leaves `acct`
//! bit-identical to its pre-call state (spec §5: "a failed receiver
//! validation MUST leave it bit-identical", the same rule applies here to
//! propose's own clone-then-commit boundary).

use crate::delta::Delta;
use crate::env::{Env, TxExecCtx};
use crate::error::ConsensusError;
use crate::exec::{execute_one, TxExecResult};
use crate::frame::{compute_frame_hash, Frame};
use crate::ids::Hash;
use crate::machine::AccountMachine;
use crate::tx::AccountTx;
use crate::wire::Proposal;

fn compute_timestamp(acct: &AccountMachine, env: &Env) -> i64 {
    let now = env.now();
    match &acct.current_frame {
        Some(f) => now.max(f.timestamp + 1),
        None => now,
    }
}

/// C2: `propose(env, acct, skipNonceIncrement, jHeightHint) -> Proposal`.
///
/// # Errors
///
/// Returns a message-level `ConsensusError` if the account is halted, the
/// mempool is empty or over capacity, a frame is already pending, the
/// right side lacks a matching left claim to propose against, every
/// mempool tx fails validation, the assembled frame exceeds the size cap,
/// or signing fails. Returns `ConsensusError::Fatal` if a mempool tx
/// violates the settlement-vector invariant.
#[allow(clippy::too_many_lines)] // sequential validate/sign/commit steps, kept linear
pub async fn propose(
    acct: &mut AccountMachine,
    env: &Env,
    skip_nonce_increment: bool,
    j_height_hint: Option<u64>,
) -> Result<Proposal, ConsensusError> {
    if acct.is_halted() {
        return Err(ConsensusError::AccountHalted);
    }
    if acct.mempool.is_empty() {
        return Err(ConsensusError::NothingToPropose);
    }
    if acct.pending_frame.is_some() {
        return Err(ConsensusError::WaitingForAck);
    }
    if acct.mempool.len() > acct.config.max_mempool {
        return Err(ConsensusError::MempoolOverflow);
    }

    // Right-side j-claim gate (spec step 2): breaks the symmetric deadlock
    // where both sides propose same-height claim-only frames.
    if !acct.is_left() {
        let all_claims = acct.mempool.iter().all(AccountTx::is_j_event_claim);
        if all_claims {
            let matched = acct.mempool.iter().any(|t| {
                t.as_j_event_claim().is_some_and(|c| {
                    acct.left_j_observations
                        .iter()
                        .any(|o| o.j_height == c.j_height && o.j_block_hash == c.j_block_hash)
                })
            });
            if !matched {
                return Err(ConsensusError::RightAwaitingLeftClaim);
            }
        }
    }

    let by_left = acct.is_left();
    let timestamp = compute_timestamp(acct, env);
    let j_height = j_height_hint.unwrap_or(acct.last_finalized_j_height);
    let ctx = TxExecCtx {
        by_left,
        timestamp,
        j_height,
        is_validation: true,
    };

    // Step 3: clone and raise the clone's dispute nonce for the proof it
    // will help build.
    let mut clone = acct.clone();
    clone.proof_header.dispute_nonce = acct.current_height + 1;

    // Step 4: execute every mempool tx on the clone, tracking which applied.
    let mempool_snapshot: Vec<AccountTx> = acct.mempool.iter().cloned().collect();
    let mut applied_txs = Vec::with_capacity(mempool_snapshot.len());
    let mut failed_htlc_locks = Vec::new();

    for tx in &mempool_snapshot {
        match execute_one(&mut clone, tx, ctx, env).await {
            Ok(TxExecResult::Applied) => {
                tracing::debug!(tx_type = tx.type_name(), "tx applied during proposal validation");
                applied_txs.push(tx.clone());
            }
            Ok(TxExecResult::Failed(reason)) => {
                tracing::warn!(tx_type = tx.type_name(), reason = %reason, "tx failed proposal validation");
                if tx.type_name() == "htlc_lock" {
                    failed_htlc_locks.push(tx.clone());
                }
            }
            Err(fatal) => {
                acct.halted = Some(fatal.clone());
                return Err(ConsensusError::Fatal(fatal));
            }
        }
    }

    if applied_txs.is_empty() {
        return Err(ConsensusError::TxValidationSkipped);
    }

    // Step 5: token filter (I5), ascending tokenId (BTreeMap iteration order).
    let mut token_ids = Vec::new();
    let mut deltas_arr = Vec::new();
    let mut full_delta_states: Vec<Delta> = Vec::new();
    for delta in clone.deltas.values() {
        if delta.has_bilateral_footprint() {
            token_ids.push(delta.token_id);
            deltas_arr.push(delta.offdelta);
            full_delta_states.push(delta.clone());
        }
    }

    // Steps 6-7: assemble and hash the frame.
    let mut frame = Frame {
        height: acct.current_height + 1,
        timestamp,
        j_height,
        prev_frame_hash: acct.head_hash(),
        account_txs: applied_txs,
        token_ids,
        deltas: deltas_arr,
        full_delta_states,
        by_left,
        state_hash: Hash([0u8; 32]),
    };

    if frame.canonical_bytes().len() > acct.config.max_frame_bytes {
        return Err(ConsensusError::FrameTooLarge);
    }
    frame.state_hash = compute_frame_hash(&frame);

    // Step 8: sign and build the dispute proof, all against the clone.
    let depository = env.depository.depository_address().await?;
    let proof_body = env.dispute_builder.build_account_proof_body(&clone);
    let dispute_hash = env.dispute_builder.create_dispute_proof_hash(
        proof_body.proof_body_hash,
        depository,
        acct.left_entity,
        acct.right_entity,
    );

    let hankos = env
        .signing_oracle
        .sign_hashes_as_single_entity(
            acct.self_entity,
            acct.self_entity,
            &[frame.state_hash, dispute_hash],
        )
        .await
        .map_err(ConsensusError::SigningFailed)?;

    let [frame_hanko, dispute_hanko] = <[_; 2]>::try_from(hankos)
        .map_err(|_| ConsensusError::DisputeProofBuildFailed)?;
    if frame_hanko.is_empty() || dispute_hanko.is_empty() {
        return Err(ConsensusError::SigningFailed(
            crate::error::SigningError::EmptySignature,
        ));
    }

    // Step 9: commit intent on the real account — only now do we mutate it.
    let nonce_at_signing = acct.proof_header.nonce;
    acct.pending_frame = Some(frame.clone());
    acct.dispute_proof_nonces_by_hash
        .insert(proof_body.proof_body_hash, nonce_at_signing);
    acct.dispute_proof_bodies_by_hash
        .insert(proof_body.proof_body_hash, proof_body.clone());
    acct.current_dispute_proof_hanko = Some(dispute_hanko.clone());
    acct.current_dispute_proof_body_hash = Some(proof_body.proof_body_hash);
    acct.current_dispute_proof_nonce = Some(nonce_at_signing);
    if !skip_nonce_increment {
        acct.proof_header.nonce += 1;
    }

    // Step 10: clear the mempool of every tx we just processed (success or
    // failure — failures were already dropped from consideration above).
    for _ in 0..mempool_snapshot.len() {
        acct.mempool.pop_front();
    }

    tracing::info!(
        height = frame.height,
        nonce = nonce_at_signing,
        tx_count = frame.account_txs.len(),
        "proposed frame"
    );

    Ok(Proposal {
        frame,
        frame_hanko,
        dispute_hanko,
        dispute_proof_body_hash: proof_body.proof_body_hash,
        nonce: nonce_at_signing,
        failed_htlc_locks,
    })
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::testutil;

    #[traced_test]
    #[tokio::test]
    async fn propose_logs_the_assembled_frame() {
        let (mut left, _right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        left.mempool.push_back(testutil::payment_tx(1, 1000));
        let env = testutil::fixed_env(0);

        propose(&mut left, &env, false, None).await.unwrap();

        assert!(logs_contain("proposed frame"));
    }
}
