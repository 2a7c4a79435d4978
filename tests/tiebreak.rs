//! Simultaneous-collision tiebreak and injection-resistance scenarios
//! (spec §8: S2, S3).

use account_consensus::{proposer, receiver, testutil, AccountInput, ConsensusEvent};

fn envelope(
    proposal: &account_consensus::Proposal,
    from: account_consensus::EntityId,
    to: account_consensus::EntityId,
) -> AccountInput {
    AccountInput {
        from_entity: from,
        to_entity: to,
        height: Some(proposal.frame.height),
        new_account_frame: Some(proposal.frame.clone()),
        new_hanko: Some(proposal.frame_hanko.clone()),
        prev_hanko: None,
        new_dispute_hanko: Some(proposal.dispute_hanko.clone()),
        new_dispute_hash: None,
        new_dispute_proof_body_hash: Some(proposal.dispute_proof_body_hash),
        dispute_proof_nonce: Some(proposal.nonce),
        new_settlement_hanko: None,
    }
}

fn setup_pair() -> (
    account_consensus::AccountMachine,
    account_consensus::AccountMachine,
    account_consensus::Env,
) {
    let (mut left, mut right) = testutil::genesis_pair();
    testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
    testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
    let env = testutil::fixed_env(1_000);
    (left, right, env)
}

/// S2: both propose at h=1 simultaneously. Left wins, right rolls back and
/// re-proposes its tx at h=2; both converge.
#[tokio::test]
async fn s2_simultaneous_collision_left_wins() {
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));
    right.mempool.push_back(testutil::payment_tx(1, -250));

    let left_proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .unwrap();
    let right_proposal = proposer::propose(&mut right, &env, false, None)
        .await
        .unwrap();

    // Left receives right's h=1 proposal first and ignores it.
    let from_right = envelope(&right_proposal, right.self_entity, left.self_entity);
    let left_handled = receiver::handle_input(&mut left, &env, &from_right).await.unwrap();
    assert!(matches!(
        left_handled.events.as_slice(),
        [ConsensusEvent::LeftWins { .. }]
    ));
    assert!(left_handled.outbound.is_none());
    assert_eq!(left.current_height, 0);

    // Right receives left's h=1 proposal, rolls back, re-commits left's
    // frame, and chains its own tx at h=2.
    let from_left = envelope(&left_proposal, left.self_entity, right.self_entity);
    let right_handled = receiver::handle_input(&mut right, &env, &from_left).await.unwrap();
    assert!(right_handled
        .events
        .iter()
        .any(|e| matches!(e, ConsensusEvent::Rollback { .. })));
    assert_eq!(right.rollback_count, 1);
    assert_eq!(right.current_height, 1);

    let batched = right_handled.outbound.expect("right chains its rolled-back tx");
    assert!(batched.new_account_frame.is_some());

    // Left commits h=1 from the ack, then right's chained h=2 proposal.
    receiver::handle_input(&mut left, &env, &batched).await.unwrap();
    assert_eq!(left.current_height, 2);
}

/// S3: sender inflates a bilateral field beyond what the receiver computes
/// from the same txs; the receiver must reject before mutating state.
#[tokio::test]
async fn s3_injection_attempt_rejected() {
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 500));

    let mut proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .unwrap();
    // Tamper with the claimed fullDeltaStates after the frame was hashed and
    // signed, simulating a malicious or buggy proposer.
    proposal.frame.full_delta_states[0].left_credit_limit = ethnum::I256::from(1_000_000_000i64);

    let before = right.deltas.clone();
    let msg = envelope(&proposal, left.self_entity, right.self_entity);
    let result = receiver::handle_input(&mut right, &env, &msg).await;

    assert!(matches!(
        result,
        Err(account_consensus::ConsensusError::FrameHashMismatch)
            | Err(account_consensus::ConsensusError::BilateralStateInjection)
    ));
    assert_eq!(right.deltas, before);
    assert_eq!(right.current_height, 0);
}
