//! Receiver, tiebreaker, ACK commit, and batching (C3/C4/C5/C6, spec §4.3-§4.6).

use crate::env::{Env, TxExecCtx};
use crate::error::{ConsensusError, FatalError};
use crate::exec::{execute_all, TxExecResult};
use crate::frame::compute_frame_hash;
use crate::ids::Hash;
use crate::jevents::finalize_j_events;
use crate::machine::{AccountMachine, JObservation};
use crate::proposer::propose;
use crate::wire::{AccountInput, ConsensusEvent, HandleOk};

const CLOCK_DRIFT_TOLERANCE_SECS: i64 = 5 * 60;
const TIMESTAMP_BACKWARD_TOLERANCE_SECS: i64 = 1;

fn structural_validation(
    acct: &AccountMachine,
    frame: &crate::frame::Frame,
    env: &Env,
) -> Result<(), ConsensusError> {
    if frame.account_txs.len() > acct.config.max_account_txs_per_frame {
        return Err(ConsensusError::InvalidFrameStructure(
            "too many account txs".into(),
        ));
    }
    if frame.token_ids.len() != frame.deltas.len() {
        return Err(ConsensusError::InvalidFrameStructure(
            "tokenIds/deltas length mismatch".into(),
        ));
    }
    let now = env.now();
    if (frame.timestamp - now).abs() > CLOCK_DRIFT_TOLERANCE_SECS {
        return Err(ConsensusError::InvalidFrameStructure(
            "timestamp outside clock drift tolerance".into(),
        ));
    }
    if let Some(prev) = &acct.current_frame {
        if frame.timestamp < prev.timestamp - TIMESTAMP_BACKWARD_TOLERANCE_SECS {
            return Err(ConsensusError::InvalidFrameStructure(
                "timestamp regresses past tolerance".into(),
            ));
        }
    }
    Ok(())
}

async fn record_counterparty_dispute_metadata(
    acct: &mut AccountMachine,
    msg: &AccountInput,
    env: &Env,
) {
    let (Some(hanko), Some(hash), Some(nonce)) = (
        &msg.new_dispute_hanko,
        &msg.new_dispute_hash,
        msg.dispute_proof_nonce,
    ) else {
        return;
    };
    let counterparty = acct.counterparty();
    let hanko_valid = env
        .hanko_verifier
        .verify_hanko_for_hash(hanko, *hash, counterparty)
        .await;
    match hanko_valid {
        Ok(true) => {
            acct.counterparty_dispute_proof_hanko = Some(hanko.clone());
            acct.counterparty_dispute_proof_body_hash = msg.new_dispute_proof_body_hash;
            acct.counterparty_dispute_proof_nonce = Some(nonce);
            if let Some(body_hash) = msg.new_dispute_proof_body_hash {
                acct.dispute_proof_nonces_by_hash.insert(body_hash, nonce);
            }
        }
        Ok(false) => {
            tracing::warn!("counterparty dispute hanko failed verification, ignoring");
        }
        Err(e) => {
            tracing::warn!(error = %e, "counterparty dispute hanko verification errored, ignoring");
        }
    }
}

/// C3: validates, commits, and ACKs a new-frame message. Called after the
/// ACK half of the envelope (if any) has already been processed.
#[allow(clippy::too_many_lines)] // sequential validate/commit/ack steps, kept linear
async fn handle_new_frame(
    acct: &mut AccountMachine,
    env: &Env,
    msg: &AccountInput,
    events: &mut Vec<ConsensusEvent>,
) -> Result<Option<AccountInput>, ConsensusError> {
    let frame = msg
        .new_account_frame
        .as_ref()
        .expect("caller guarantees new_account_frame is Some");

    structural_validation(acct, frame, env)?;

    // I2: chain link.
    if frame.prev_frame_hash != acct.head_hash() {
        return Err(ConsensusError::FrameChainBroken);
    }

    // C4: simultaneous-proposal tiebreak.
    if let Some(pending) = &acct.pending_frame {
        if pending.height == frame.height {
            if acct.is_left() {
                events.push(ConsensusEvent::LeftWins {
                    ignored_frame_hash: frame.state_hash,
                });
                return Ok(None);
            }

            let duplicate_rollback = acct.last_rollback_frame_hash == Some(frame.state_hash);
            if acct.rollback_count >= acct.config.max_rollback_count && !duplicate_rollback {
                let fatal = FatalError::ConsensusStalled;
                acct.halted = Some(fatal.clone());
                return Err(ConsensusError::Fatal(fatal));
            }

            for tx in pending.account_txs.iter().rev() {
                acct.mempool.push_front(tx.clone());
            }
            acct.pending_frame = None;
            acct.last_rollback_frame_hash = Some(frame.state_hash);
            if !duplicate_rollback {
                acct.rollback_count += 1;
            }
            events.push(ConsensusEvent::Rollback {
                winning_frame_hash: frame.state_hash,
            });
        }
    }

    // I1: sequence.
    if frame.height != acct.current_height + 1 {
        return Err(ConsensusError::FrameSequenceMismatch {
            expected: acct.current_height + 1,
            got: frame.height,
        });
    }

    // Hanko verification.
    let new_hanko = msg
        .new_hanko
        .as_ref()
        .ok_or(ConsensusError::InvalidHankoSignature)?;
    let verified = env
        .hanko_verifier
        .verify_hanko_for_hash(new_hanko, frame.state_hash, msg.from_entity)
        .await
        .map_err(ConsensusError::SigningFailed)?;
    if !verified {
        return Err(ConsensusError::InvalidHankoSignature);
    }

    // Clone & execute.
    let ctx = TxExecCtx {
        by_left: frame.by_left,
        timestamp: frame.timestamp,
        j_height: frame.j_height,
        is_validation: true,
    };
    let mut clone = acct.clone();
    let results = execute_all(&mut clone, &frame.account_txs, ctx, env).await.map_err(|fatal| {
        acct.halted = Some(fatal.clone());
        ConsensusError::Fatal(fatal)
    })?;
    if results.iter().any(|(_, r)| matches!(r, TxExecResult::Failed(_))) {
        return Err(ConsensusError::FrameApplicationFailed);
    }

    // I4/I5: bilateral equivalence against the clone's own computation.
    let mut computed_token_ids = Vec::new();
    let mut computed_deltas = Vec::new();
    for delta in clone.deltas.values() {
        if delta.has_bilateral_footprint() {
            computed_token_ids.push(delta.token_id);
            computed_deltas.push(delta.offdelta);
        }
    }
    if computed_token_ids != frame.token_ids || computed_deltas != frame.deltas {
        return Err(ConsensusError::BilateralConsensusMismatch);
    }

    // Injection guard: compare the B-subset of the sender's claimed
    // fullDeltaStates against what we just computed ourselves.
    for claimed in &frame.full_delta_states {
        let ours = clone
            .deltas
            .get(&claimed.token_id)
            .ok_or(ConsensusError::BilateralStateInjection)?;
        if ours.bilateral_projection() != claimed.bilateral_projection() {
            return Err(ConsensusError::BilateralStateInjection);
        }
    }

    // Frame-hash verification, against the sender's own fullDeltaStates
    // (spec §9 resolution of the dual-recomputation ambiguity).
    let mut sender_view = frame.clone();
    sender_view.state_hash = Hash([0u8; 32]);
    if compute_frame_hash(&sender_view) != frame.state_hash {
        return Err(ConsensusError::FrameHashMismatch);
    }

    // Commit to real state: re-execute, not validation.
    let commit_ctx = TxExecCtx {
        is_validation: false,
        ..ctx
    };
    match execute_all(acct, &frame.account_txs, commit_ctx, env).await {
        Ok(results) if results.iter().all(|(_, r)| matches!(r, TxExecResult::Applied)) => {}
        _ => {
            let fatal = FatalError::ReceiverCommitFailed;
            acct.halted = Some(fatal.clone());
            return Err(ConsensusError::Fatal(fatal));
        }
    }

    acct.current_frame = Some(frame.clone());
    acct.current_height = frame.height;
    acct.push_history(frame.clone());
    acct.pending_frame = None;

    record_counterparty_dispute_metadata(acct, msg, env).await;

    // Propagate j_event_claim observations into the opposite bucket: a
    // claim inside a committed frame encodes the counterparty's view.
    for tx in &frame.account_txs {
        if let Some(claim) = tx.as_j_event_claim() {
            let obs = JObservation {
                j_height: claim.j_height,
                j_block_hash: claim.j_block_hash,
                events: claim.events.clone(),
            };
            if acct.is_left() {
                acct.right_j_observations.push(obs);
            } else {
                acct.left_j_observations.push(obs);
            }
        }
    }
    let finalized = finalize_j_events(acct, env);

    events.push(ConsensusEvent::BilateralFrameCommitted {
        from_entity: msg.from_entity,
        to_entity: msg.to_entity,
        height: frame.height,
        tx_count: frame.account_txs.len(),
        token_ids: computed_token_ids,
        state_hash: frame.state_hash,
    });
    let _ = finalized; // surfaced via acct.j_event_chain; no separate event type defined.

    build_ack(acct, env).await.map(Some)
}

/// Builds the outbound ACK for the just-committed frame, chaining a new
/// proposal when the mempool is non-empty (C6).
async fn build_ack(acct: &mut AccountMachine, env: &Env) -> Result<AccountInput, ConsensusError> {
    let committed = acct
        .current_frame
        .clone()
        .expect("build_ack called only after a commit");

    let prev_hanko = env
        .signing_oracle
        .sign_hashes_as_single_entity(acct.self_entity, acct.self_entity, &[committed.state_hash])
        .await
        .map_err(ConsensusError::SigningFailed)?
        .into_iter()
        .next()
        .ok_or(ConsensusError::SigningFailed(
            crate::error::SigningError::EmptySignature,
        ))?;

    acct.proof_header.dispute_nonce = acct.current_height;
    let depository = env.depository.depository_address().await?;
    let proof_body = env.dispute_builder.build_account_proof_body(acct);
    let dispute_hash = env.dispute_builder.create_dispute_proof_hash(
        proof_body.proof_body_hash,
        depository,
        acct.left_entity,
        acct.right_entity,
    );
    let dispute_hanko = env
        .signing_oracle
        .sign_hashes_as_single_entity(acct.self_entity, acct.self_entity, &[dispute_hash])
        .await
        .map_err(ConsensusError::SigningFailed)?
        .into_iter()
        .next()
        .ok_or(ConsensusError::SigningFailed(
            crate::error::SigningError::EmptySignature,
        ))?;
    acct.dispute_proof_nonces_by_hash
        .insert(proof_body.proof_body_hash, acct.proof_header.nonce);
    acct.dispute_proof_bodies_by_hash
        .insert(proof_body.proof_body_hash, proof_body.clone());

    acct.proof_header.nonce += 1;

    let mut outbound = AccountInput {
        from_entity: acct.self_entity,
        to_entity: acct.counterparty(),
        height: Some(committed.height),
        new_account_frame: None,
        new_hanko: None,
        prev_hanko: Some(prev_hanko),
        new_dispute_hanko: Some(dispute_hanko),
        new_dispute_hash: Some(dispute_hash),
        new_dispute_proof_body_hash: Some(proof_body.proof_body_hash),
        dispute_proof_nonce: Some(acct.proof_header.nonce - 1),
        new_settlement_hanko: None,
    };

    if !acct.mempool.is_empty() && acct.pending_frame.is_none() {
        match propose(acct, env, true, None).await {
            Ok(proposal) => {
                outbound.new_account_frame = Some(proposal.frame);
                outbound.new_hanko = Some(proposal.frame_hanko);
            }
            Err(e) => {
                tracing::debug!(error = %e, "chained proposal after ack declined");
            }
        }
    }

    Ok(outbound)
}

/// C5: verifies and commits an ACK against `pending_frame`.
async fn handle_ack(
    acct: &mut AccountMachine,
    env: &Env,
    msg: &AccountInput,
) -> Result<(), ConsensusError> {
    let pending = acct
        .pending_frame
        .clone()
        .ok_or(ConsensusError::UnmatchedAck)?;

    let matches_plain = msg.height == Some(pending.height);
    let matches_batched = msg
        .new_account_frame
        .as_ref()
        .is_some_and(|f| f.height == pending.height + 1);
    if !matches_plain && !matches_batched {
        return Err(ConsensusError::UnmatchedAck);
    }

    let prev_hanko = msg
        .prev_hanko
        .as_ref()
        .ok_or(ConsensusError::AckEntityMismatch)?;
    let verified = env
        .hanko_verifier
        .verify_hanko_for_hash(prev_hanko, pending.state_hash, msg.from_entity)
        .await
        .map_err(ConsensusError::SigningFailed)?;
    if !verified || msg.from_entity != acct.proof_header.to_entity {
        return Err(ConsensusError::AckEntityMismatch);
    }

    let ctx = TxExecCtx {
        by_left: pending.by_left,
        timestamp: pending.timestamp,
        j_height: pending.j_height,
        is_validation: false,
    };
    match execute_all(acct, &pending.account_txs, ctx, env).await {
        Ok(results) if results.iter().all(|(_, r)| matches!(r, TxExecResult::Applied)) => {}
        _ => {
            let fatal = FatalError::ProposerCommitFailed;
            acct.halted = Some(fatal.clone());
            return Err(ConsensusError::Fatal(fatal));
        }
    }

    acct.current_frame = Some(pending.clone());
    acct.current_height += 1;
    acct.push_history(pending);
    acct.proof_header.dispute_nonce = acct.current_height;

    record_counterparty_dispute_metadata(acct, msg, env).await;
    finalize_j_events(acct, env);

    acct.pending_frame = None;
    if acct.rollback_count > 0 {
        acct.rollback_count -= 1;
    }
    if acct.rollback_count == 0 {
        acct.last_rollback_frame_hash = None;
    }
    Ok(())
}

/// C3/C4/C5/C6: `handle_input(env, acct, msg) -> Result<HandleOk, ConsensusError>`.
///
/// ACK effects are applied before new-frame effects when both are present in
/// one envelope (spec §5: "within a single message, ACK effects are observed
/// before new-frame effects").
///
/// # Errors
///
/// Returns a message-level `ConsensusError` on any structural, sequencing,
/// signature, or bilateral-consistency violation in `msg`; these leave
/// `acct` unchanged. Returns `ConsensusError::Fatal` if commit fails after
/// validation passed, or if the rollback bound is exceeded.
pub async fn handle_input(
    acct: &mut AccountMachine,
    env: &Env,
    msg: &AccountInput,
) -> Result<HandleOk, ConsensusError> {
    if acct.is_halted() {
        return Err(ConsensusError::AccountHalted);
    }

    let mut events = Vec::new();

    if msg.is_ack() {
        handle_ack(acct, env, msg).await?;
    } else if acct.pending_frame.is_none() && !msg.is_proposal() {
        return Err(ConsensusError::UnmatchedAck);
    }

    let outbound = if msg.is_proposal() {
        handle_new_frame(acct, env, msg, &mut events).await?
    } else if msg.is_ack() {
        // Plain ACK, no batched proposal from the peer: chain one of our
        // own if the mempool still has work (spec §4.5 step 6).
        if !acct.mempool.is_empty() && acct.pending_frame.is_none() {
            match propose(acct, env, false, None).await {
                Ok(proposal) => Some(AccountInput {
                    from_entity: acct.self_entity,
                    to_entity: acct.counterparty(),
                    height: Some(proposal.frame.height),
                    new_account_frame: Some(proposal.frame),
                    new_hanko: Some(proposal.frame_hanko),
                    prev_hanko: None,
                    new_dispute_hanko: Some(proposal.dispute_hanko),
                    new_dispute_hash: None,
                    new_dispute_proof_body_hash: Some(proposal.dispute_proof_body_hash),
                    dispute_proof_nonce: Some(proposal.nonce),
                    new_settlement_hanko: None,
                }),
                Err(e) => {
                    tracing::debug!(error = %e, "chained proposal after plain ack declined");
                    None
                }
            }
        } else {
            None
        }
    } else {
        None
    };

    Ok(HandleOk { events, outbound })
}
