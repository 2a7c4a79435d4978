//! Property-based tests for the universally quantified invariants
//! (spec §8, properties 1-7).

use ethnum::I256;
use proptest::prelude::*;

use account_consensus::{
    compute_frame_hash, proposer, receiver, testutil, AccountInput, ConsensusError, EntityId,
    Proposal,
};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

fn envelope(proposal: &Proposal, from: EntityId, to: EntityId) -> AccountInput {
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

/// Runs `from` proposing one payment tx, `to` receiving it, and `from`
/// committing the resulting ACK. Panics (failing the property) if any step
/// errors, since every generated amount here is kept within credit limits.
fn settle_one_round(
    from: &mut account_consensus::AccountMachine,
    to: &mut account_consensus::AccountMachine,
    env: &account_consensus::Env,
    amount: i128,
) {
    from.mempool.push_back(testutil::payment_tx(1, amount));
    let proposal = block_on(proposer::propose(from, env, false, None)).unwrap();
    let msg = envelope(&proposal, from.self_entity, to.self_entity);
    let handled = block_on(receiver::handle_input(to, env, &msg)).unwrap();
    let ack = handled.outbound.expect("receiver always acks a lone proposal");
    block_on(receiver::handle_input(from, env, &ack)).unwrap();
}

proptest! {
    /// Property 1: any sequence of alternating, mutually consistent
    /// payments converges to identical `stateHash` and bilateral
    /// projection on both sides.
    #[test]
    fn property1_alternating_payments_converge(
        amounts in prop::collection::vec(-400i128..=400i128, 1..8)
    ) {
        let (mut left, mut right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
        let env = testutil::fixed_env(0);

        for (i, amount) in amounts.iter().enumerate() {
            if i % 2 == 0 {
                settle_one_round(&mut left, &mut right, &env, *amount);
            } else {
                settle_one_round(&mut right, &mut left, &env, *amount);
            }
        }

        prop_assert_eq!(left.head_hash(), right.head_hash());
        prop_assert_eq!(
            left.deltas[&1].bilateral_projection(),
            right.deltas[&1].bilateral_projection()
        );
    }

    /// Property 2: every retained frame's own hash matches its `stateHash`,
    /// and its `prevFrameHash` chains to the previous frame's `stateHash`.
    #[test]
    fn property2_frame_chain_is_internally_consistent(
        amounts in prop::collection::vec(-300i128..=300i128, 1..6)
    ) {
        let (mut left, mut right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
        let env = testutil::fixed_env(0);

        for amount in &amounts {
            settle_one_round(&mut left, &mut right, &env, *amount);
        }

        let mut prev_hash = None;
        for frame in &right.frame_history {
            prop_assert_eq!(compute_frame_hash(frame), frame.state_hash);
            prop_assert_eq!(frame.prev_frame_hash, prev_hash);
            prev_hash = Some(frame.state_hash);
        }
    }

    /// Property 3: a non-`j_event_claim` tx never changes `collateral` or
    /// `ondelta` (the settlement-vector invariant).
    #[test]
    fn property3_payments_never_touch_settlement_vector(
        amounts in prop::collection::vec(-300i128..=300i128, 1..6)
    ) {
        let (mut left, mut right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
        let env = testutil::fixed_env(0);

        for amount in &amounts {
            settle_one_round(&mut left, &mut right, &env, *amount);
            for acct in [&left, &right] {
                if let Some(d) = acct.deltas.get(&1) {
                    prop_assert_eq!(d.collateral, I256::ZERO);
                    prop_assert_eq!(d.ondelta, I256::ZERO);
                }
            }
        }
    }

    /// Property 4: `proofHeader.nonce` never decreases across processed
    /// messages.
    #[test]
    fn property4_nonce_is_monotonically_non_decreasing(
        amounts in prop::collection::vec(-300i128..=300i128, 1..6)
    ) {
        let (mut left, mut right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
        let env = testutil::fixed_env(0);

        let mut last_nonce = left.proof_header.nonce;
        for amount in &amounts {
            settle_one_round(&mut left, &mut right, &env, *amount);
            prop_assert!(left.proof_header.nonce >= last_nonce);
            last_nonce = left.proof_header.nonce;
        }
    }

    /// Property 5: on a same-height collision the lexicographically
    /// smaller entity wins, and the losing side's `rollbackCount`
    /// increments exactly once before converging.
    #[test]
    fn property5_collision_survivor_is_lexicographically_smaller(
        left_amount in -300i128..=300i128,
        right_amount in -300i128..=300i128,
    ) {
        prop_assume!(left_amount != 0 && right_amount != 0);
        let (mut left, mut right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
        let env = testutil::fixed_env(0);

        left.mempool.push_back(testutil::payment_tx(1, left_amount));
        right.mempool.push_back(testutil::payment_tx(1, right_amount));

        let left_proposal = block_on(proposer::propose(&mut left, &env, false, None)).unwrap();
        let right_proposal = block_on(proposer::propose(&mut right, &env, false, None)).unwrap();

        prop_assert!(left.self_entity.is_left_of(&right.self_entity));

        let from_right = envelope(&right_proposal, right.self_entity, left.self_entity);
        let left_handled = block_on(receiver::handle_input(&mut left, &env, &from_right)).unwrap();
        prop_assert!(left_handled.outbound.is_none());
        prop_assert_eq!(left.current_height, 0);

        let from_left = envelope(&left_proposal, left.self_entity, right.self_entity);
        let right_handled = block_on(receiver::handle_input(&mut right, &env, &from_left)).unwrap();
        prop_assert_eq!(right.rollback_count, 1);
        prop_assert_eq!(right.current_height, 1);

        if let Some(batched) = right_handled.outbound {
            block_on(receiver::handle_input(&mut left, &env, &batched)).unwrap();
        }
        // Left has now committed right's chained h=2 proposal; both sides
        // agree on what height 1 settled to.
        prop_assert_eq!(left.frame_history.front().map(|f| f.state_hash), right.head_hash());
    }

    /// Property 6: after any successful commit, `tokenIds` is strictly
    /// ascending and every listed token has a nonzero bilateral footprint
    /// (I5).
    #[test]
    fn property6_token_ids_ascending_and_i5_holds(
        token_amounts in prop::collection::vec((1u32..5, 1i128..=300), 1..4)
    ) {
        let (mut left, mut right) = testutil::genesis_pair();
        for (token_id, _) in &token_amounts {
            testutil::seed_credit_limits(&mut left, *token_id, 10_000, 10_000);
            testutil::seed_credit_limits(&mut right, *token_id, 10_000, 10_000);
        }
        let env = testutil::fixed_env(0);

        for (token_id, amount) in &token_amounts {
            left.mempool.push_back(testutil::payment_tx(*token_id, *amount));
        }
        let proposal = block_on(proposer::propose(&mut left, &env, false, None)).unwrap();
        let msg = envelope(&proposal, left.self_entity, right.self_entity);
        block_on(receiver::handle_input(&mut right, &env, &msg)).unwrap();

        let ids = &proposal.frame.token_ids;
        for w in ids.windows(2) {
            prop_assert!(w[0] < w[1]);
        }
        for id in ids {
            let d = &right.deltas[id];
            prop_assert!(d.has_bilateral_footprint());
        }
    }

    /// Property 7: a bilateral-field mismatch between the sender's claimed
    /// `fullDeltaStates` and the receiver's own computation is rejected
    /// before any state mutation, regardless of which bilateral field (or
    /// how much) was inflated.
    #[test]
    fn property7_any_bilateral_field_injection_is_rejected(
        amount in 1i128..=500,
        inflate_by in 1i64..=1_000_000_000,
    ) {
        let (mut left, mut right) = testutil::genesis_pair();
        testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
        testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
        let env = testutil::fixed_env(0);

        left.mempool.push_back(testutil::payment_tx(1, amount));
        let mut proposal = block_on(proposer::propose(&mut left, &env, false, None)).unwrap();
        proposal.frame.full_delta_states[0].left_credit_limit += I256::from(inflate_by);

        let before = right.deltas.clone();
        let msg = envelope(&proposal, left.self_entity, right.self_entity);
        let result = block_on(receiver::handle_input(&mut right, &env, &msg));

        prop_assert!(matches!(
            result,
            Err(ConsensusError::FrameHashMismatch) | Err(ConsensusError::BilateralStateInjection)
        ));
        prop_assert_eq!(right.deltas, before);
        prop_assert_eq!(right.current_height, 0);
    }
}
