//! Shared transaction-execution helper (spec §4.2 step 4, §4.3 steps 6/9).
//!
//! Used both for clone-side validation (proposer and receiver) and for
//! committing to real state (receiver and ack-path), so the settlement-
//! vector guard is enforced identically everywhere a tx touches state.

use ethnum::I256;

use crate::env::{Env, TxExecCtx, TxOutcome};
use crate::error::FatalError;
use crate::machine::AccountMachine;
use crate::tx::AccountTx;

/// Outcome of executing one transaction against `acct`.
pub enum TxExecResult {
    Applied,
    Failed(String),
}

/// Executes `tx` against `acct` and enforces the settlement-vector
/// invariant: only `j_event_claim` may change `collateral`/`ondelta`
/// (spec testable property 3). A violation is always fatal — it means the
/// injected tx handler broke its contract, not a protocol-level message
/// error.
///
/// # Errors
///
/// Returns `FatalError::SettlementVectorInvariantViolated` if `tx` is not a
/// `j_event_claim` but the handler mutated `collateral`/`ondelta` anyway.
pub async fn execute_one(
    acct: &mut AccountMachine,
    tx: &AccountTx,
    ctx: TxExecCtx,
    env: &Env,
) -> Result<TxExecResult, FatalError> {
    let guard_applies = !tx.is_j_event_claim();
    let before: Vec<(u32, I256, I256)> = if guard_applies {
        acct.deltas
            .values()
            .map(|d| (d.token_id, d.collateral, d.ondelta))
            .collect()
    } else {
        Vec::new()
    };

    let outcome: TxOutcome = env.tx_handler.process_account_tx(acct, tx, ctx).await;

    if !outcome.success {
        return Ok(TxExecResult::Failed(outcome.error.unwrap_or_default()));
    }

    if guard_applies {
        let before_ids: std::collections::HashSet<u32> =
            before.iter().map(|(id, ..)| *id).collect();
        for (token_id, collateral, ondelta) in &before {
            if let Some(d) = acct.deltas.get(token_id) {
                if d.collateral != *collateral || d.ondelta != *ondelta {
                    return Err(FatalError::SettlementVectorInvariantViolated);
                }
            }
        }
        for (token_id, d) in &acct.deltas {
            if !before_ids.contains(token_id)
                && (d.collateral != I256::ZERO || d.ondelta != I256::ZERO)
            {
                return Err(FatalError::SettlementVectorInvariantViolated);
            }
        }
    }

    Ok(TxExecResult::Applied)
}

/// Executes a sequence of transactions, stopping at (and surfacing) the
/// first fatal settlement-vector violation. Returns the subset that
/// applied successfully in order; failures are silently skipped by the
/// caller's bookkeeping (propose) or turned into a hard error (commit
/// paths, which only ever re-run an already-validated tx list).
///
/// # Errors
///
/// Propagates the first `FatalError` surfaced by [`execute_one`].
pub async fn execute_all(
    acct: &mut AccountMachine,
    txs: &[AccountTx],
    ctx: TxExecCtx,
    env: &Env,
) -> Result<Vec<(AccountTx, TxExecResult)>, FatalError> {
    let mut results = Vec::with_capacity(txs.len());
    for tx in txs {
        let outcome = execute_one(acct, tx, ctx, env).await?;
        let tag = match &outcome {
            TxExecResult::Applied => TxExecResult::Applied,
            TxExecResult::Failed(e) => TxExecResult::Failed(e.clone()),
        };
        results.push((tx.clone(), tag));
    }
    Ok(results)
}
