//! Resource bounds and tolerances (spec §5).
//!
//! Named constants rather than magic numbers scattered through the
//! propose/receive paths. `ConsensusConfig::default()` matches the spec's
//! real caps; tests that want to exercise boundary behavior at smaller
//! scale can override individual fields while still exercising at least
//! one fixture at the real cap (spec §8 boundary behaviors).

/// Bounds governing a single account's consensus state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Max pending transactions in the mempool (spec §3, §8).
    pub max_mempool: usize,
    /// Max transactions per frame (spec §3).
    pub max_account_txs_per_frame: usize,
    /// Max serialized frame size in bytes (spec §4.2 step 7, §8).
    pub max_frame_bytes: usize,
    /// Max retained frames in the ring buffer (spec §3).
    pub max_frame_history: usize,
    /// Max rollback count before consensus is declared stalled (spec I7).
    pub max_rollback_count: u32,
    /// Allowed timestamp drift against the local clock, in seconds (spec I3).
    pub clock_drift_tolerance_secs: i64,
    /// Allowed backward slack versus the previous frame's timestamp, in
    /// seconds (spec I3, §4.3 step 1).
    pub timestamp_backward_tolerance_secs: i64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_mempool: 1000,
            max_account_txs_per_frame: 100,
            max_frame_bytes: 1024 * 1024,
            max_frame_history: 10,
            max_rollback_count: 1,
            clock_drift_tolerance_secs: 5 * 60,
            timestamp_backward_tolerance_secs: 1,
        }
    }
}
