//! Account consensus simulation node.
//!
//! Walks the S1-S6 scenarios through in-process `AccountMachine`s, using
//! the in-memory stub adapters from [`account_consensus::testutil`], as an
//! executable demonstration of propose/receive/ack, collision tiebreak,
//! injection rejection, j-event finalization, ack-then-proposal chaining,
//! and replay rejection.

use account_consensus::{
    proposer, receiver, testutil, AccountInput, AccountMachine, Env, EntityId, Hash, JEvent,
    JEventClaim, JObservation, Proposal,
};
use anyhow::Context;

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

fn setup_pair() -> (AccountMachine, AccountMachine, Env) {
    let (mut left, mut right) = testutil::genesis_pair();
    testutil::seed_credit_limits(&mut left, 1, 10_000, 10_000);
    testutil::seed_credit_limits(&mut right, 1, 10_000, 10_000);
    let env = testutil::fixed_env(1_000);
    (left, right, env)
}

fn header(name: &str, summary: &str) {
    println!();
    println!("{name}: {summary}");
    println!("{}", "-".repeat(name.len() + summary.len() + 2));
}

/// S1: simple payment converges to identical state on both sides.
async fn run_s1() -> anyhow::Result<()> {
    header("S1", "simple payment converges");
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .context("left propose")?;
    let msg = envelope(&proposal, left.self_entity, right.self_entity);
    let handled = receiver::handle_input(&mut right, &env, &msg)
        .await
        .context("right receive")?;
    let ack = handled.outbound.context("right must ack")?;
    receiver::handle_input(&mut left, &env, &ack)
        .await
        .context("left receive ack")?;

    println!("  converged: {}", left.head_hash() == right.head_hash());
    println!("  left.deltas[1].offdelta  = {}", left.deltas[&1].offdelta);
    println!("  right.deltas[1].offdelta = {}", right.deltas[&1].offdelta);
    Ok(())
}

/// S2: both propose at h=1 simultaneously; left wins, right rolls back and
/// re-proposes its tx at h=2.
async fn run_s2() -> anyhow::Result<()> {
    header("S2", "simultaneous collision, left wins");
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));
    right.mempool.push_back(testutil::payment_tx(1, -250));

    let left_proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .context("left propose")?;
    let right_proposal = proposer::propose(&mut right, &env, false, None)
        .await
        .context("right propose")?;

    let from_right = envelope(&right_proposal, right.self_entity, left.self_entity);
    let left_handled = receiver::handle_input(&mut left, &env, &from_right)
        .await
        .context("left receives right's colliding proposal")?;
    println!("  left ignores right's proposal: {:?}", left_handled.events);

    let from_left = envelope(&left_proposal, left.self_entity, right.self_entity);
    let right_handled = receiver::handle_input(&mut right, &env, &from_left)
        .await
        .context("right receives left's proposal, rolls back")?;
    println!(
        "  right rolls back (count={}) and re-chains at height {}",
        right.rollback_count, right.current_height
    );

    if let Some(batched) = right_handled.outbound {
        receiver::handle_input(&mut left, &env, &batched)
            .await
            .context("left commits ack then chained proposal")?;
    }
    println!("  left height {} right height {}", left.current_height, right.current_height);
    Ok(())
}

/// S3: sender inflates a bilateral field beyond what the receiver computes
/// from the same txs; the receiver rejects before mutating state.
async fn run_s3() -> anyhow::Result<()> {
    header("S3", "injection attempt rejected");
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 500));

    let mut proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .context("left propose")?;
    proposal.frame.full_delta_states[0].left_credit_limit = ethnum::I256::from(1_000_000_000i64);

    let msg = envelope(&proposal, left.self_entity, right.self_entity);
    let result = receiver::handle_input(&mut right, &env, &msg).await;
    println!("  tampered frame rejected: {result:?}");
    println!("  right height unchanged: {}", right.current_height);
    Ok(())
}

/// S4: a j_event_claim only finalizes once both sides' observation buckets
/// agree on the same (jHeight, jBlockHash) pair.
async fn run_s4() -> anyhow::Result<()> {
    header("S4", "j-event finalizes on 2-of-2 match");
    let (mut left, mut right, env) = setup_pair();

    let j_block_hash = Hash([0xaa; 32]);
    right.right_j_observations.push(JObservation {
        j_height: 42,
        j_block_hash,
        events: vec![JEvent {
            token_id: 1,
            collateral: ethnum::I256::from(2000i64),
            ondelta: ethnum::I256::from(100i64),
        }],
    });
    left.mempool.push_back(account_consensus::AccountTx::JEventClaim(JEventClaim {
        j_height: 42,
        j_block_hash,
        events: vec![JEvent {
            token_id: 1,
            collateral: ethnum::I256::from(2000i64),
            ondelta: ethnum::I256::from(100i64),
        }],
    }));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .context("left proposes claim")?;
    let msg = envelope(&proposal, left.self_entity, right.self_entity);
    receiver::handle_input(&mut right, &env, &msg)
        .await
        .context("right finalizes j-event")?;

    println!(
        "  right.deltas[1] collateral={} ondelta={}",
        right.deltas[&1].collateral, right.deltas[&1].ondelta
    );
    println!("  last_finalized_j_height = {}", right.last_finalized_j_height);
    Ok(())
}

/// S5: right's ack of h=1 batches a proposal for h=2 from its own mempool.
async fn run_s5() -> anyhow::Result<()> {
    header("S5", "chained ack then proposal");
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));
    right.mempool.push_back(testutil::payment_tx(1, 250));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .context("left propose")?;
    let msg = envelope(&proposal, left.self_entity, right.self_entity);
    let handled = receiver::handle_input(&mut right, &env, &msg)
        .await
        .context("right receives and chains")?;

    let batched = handled.outbound.context("right should batch ack + proposal")?;
    println!("  right batched a new frame: {}", batched.new_account_frame.is_some());
    receiver::handle_input(&mut left, &env, &batched)
        .await
        .context("left commits ack then chained proposal")?;

    println!("  left height {} right height {}", left.current_height, right.current_height);
    Ok(())
}

/// S6: replaying an already-committed proposal is rejected without
/// mutating state.
async fn run_s6() -> anyhow::Result<()> {
    header("S6", "replay rejected");
    let (mut left, mut right, env) = setup_pair();
    left.mempool.push_back(testutil::payment_tx(1, 1000));

    let proposal = proposer::propose(&mut left, &env, false, None)
        .await
        .context("left propose")?;
    let msg = envelope(&proposal, left.self_entity, right.self_entity);
    receiver::handle_input(&mut right, &env, &msg)
        .await
        .context("right commits")?;

    let before = right.deltas.clone();
    let replay = receiver::handle_input(&mut right, &env, &msg).await;
    println!("  replay rejected: {replay:?}");
    println!("  state unchanged: {}", right.deltas == before);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("Bilateral account consensus simulation");
    println!("=======================================");

    run_s1().await?;
    run_s2().await?;
    run_s3().await?;
    run_s4().await?;
    run_s5().await?;
    run_s6().await?;

    println!();
    Ok(())
}
