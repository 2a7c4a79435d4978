//! End-to-end convergence scenarios (spec §8: S1, S4, S5, S6).

use account_consensus::{proposer, receiver, testutil, AccountInput};

fn ack_envelope(
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

/// S1: simple payment converges to identical state on both sides.
#[tokio::test]
async fn s1_simple_payment_converges() {
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .unwrap();
    let msg = ack_envelope(&proposal, left.self_entity, right.self_entity);
    let handled = receiver::handle_input(&mut right, &env, &msg).await.unwrap();
    assert_eq!(right.current_height, 1);

    let ack = handled.outbound.expect("right must ack");
    receiver::handle_input(&mut left, &env, &ack).await.unwrap();

    assert_eq!(left.current_height, 1);
    assert_eq!(left.head_hash(), right.head_hash());
    assert_eq!(left.deltas[&1].bilateral_projection(), right.deltas[&1].bilateral_projection());
    assert_eq!(left.deltas[&1].offdelta, ethnum::I256::from(1000i64));
}

/// S4: a j_event_claim only finalizes once both sides' observation buckets
/// agree on the same (jHeight, jBlockHash) pair.
#[tokio::test]
async fn s4_j_event_finalizes_on_2_of_2_match() {
    let (mut left, mut right, env) = setup_pair();

    let j_block_hash = account_consensus::Hash([0xaa; 32]);
    right.right_j_observations.push(account_consensus::JObservation {
        j_height: 42,
        j_block_hash,
        events: vec![account_consensus::JEvent {
            token_id: 1,
            collateral: ethnum::I256::from(2000i64),
            ondelta: ethnum::I256::from(100i64),
        }],
    });

    left.mempool.push_back(account_consensus::AccountTx::JEventClaim(
        account_consensus::JEventClaim {
            j_height: 42,
            j_block_hash,
            events: vec![account_consensus::JEvent {
                token_id: 1,
                collateral: ethnum::I256::from(2000i64),
                ondelta: ethnum::I256::from(100i64),
            }],
        },
    ));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .unwrap();
    let msg = ack_envelope(&proposal, left.self_entity, right.self_entity);
    receiver::handle_input(&mut right, &env, &msg).await.unwrap();

    assert_eq!(right.deltas[&1].collateral, ethnum::I256::from(2000i64));
    assert_eq!(right.deltas[&1].ondelta, ethnum::I256::from(100i64));
    assert_eq!(right.last_finalized_j_height, 42);
    assert_eq!(right.j_event_chain.len(), 1);
}

/// S5: chained ACK -> proposal. While left awaits ack, right already has
/// mempool contents; right's reply batches an ack of h=1 with a proposal
/// for h=2. Left commits h=1 from the ack, then the embedded h=2 proposal.
#[tokio::test]
async fn s5_chained_ack_then_proposal() {
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));
    right.mempool.push_back(testutil::payment_tx(1, 250));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .unwrap();
    let msg = ack_envelope(&proposal, left.self_entity, right.self_entity);
    let handled = receiver::handle_input(&mut right, &env, &msg).await.unwrap();
    assert_eq!(right.current_height, 1);

    let batched = handled.outbound.expect("right should batch ack + proposal");
    assert!(batched.new_account_frame.is_some(), "right had mempool work to chain");

    receiver::handle_input(&mut left, &env, &batched).await.unwrap();

    assert_eq!(left.current_height, 2);
    assert_eq!(right.current_height, 1);
    assert_eq!(left.head_hash(), right.pending_frame.as_ref().map(|f| f.state_hash).or(right.head_hash()));
}

/// S6: replaying an already-committed proposal is rejected without mutation.
#[tokio::test]
async fn s6_replay_rejected() {
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .unwrap();
    let msg = ack_envelope(&proposal, left.self_entity, right.self_entity);
    receiver::handle_input(&mut right, &env, &msg).await.unwrap();
    assert_eq!(right.current_height, 1);

    let before = right.deltas.clone();
    let replay = receiver::handle_input(&mut right, &env, &msg).await;
    // The replayed frame's prevFrameHash points at genesis, but right has
    // already moved past genesis (I2 chain-link check fires before I1).
    assert!(matches!(
        replay,
        Err(account_consensus::ConsensusError::FrameChainBroken)
    ));
    assert_eq!(right.deltas, before);
    assert_eq!(right.current_height, 1);
}
