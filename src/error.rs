//! Error types for the bilateral account consensus core (spec §7).
//!
//! Two severity classes, both carried through `thiserror`-derived enums in
//! the teacher's style: message-level errors leave the account untouched
//! and are returned to the caller, account-level (fatal) errors halt the
//! account until an operator resets it.

use thiserror::Error;

/// Failures of the external signing/verification oracle (spec §6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("signing oracle returned no signature for the requested hash")]
    EmptySignature,

    #[error("hanko failed to verify against the claimed hash")]
    VerificationFailed,
}

/// Account-level (fatal) errors (spec §7). Require external reset or
/// dispute initiation; the account must not process further messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("receiver failed to commit a frame after all validations passed")]
    ReceiverCommitFailed,

    #[error("proposer failed to re-execute its own pending frame on ack")]
    ProposerCommitFailed,

    #[error("consensus stalled: rollback count exceeded bound without an intervening commit")]
    ConsensusStalled,

    #[error("settlement-vector invariant violated: a non-j_event_claim tx mutated collateral/ondelta")]
    SettlementVectorInvariantViolated,
}

/// Message-level (recoverable) errors, plus [`FatalError`] wrapped so
/// callers can match on a single `Result` type while still distinguishing
/// severity (spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("mempool is full")]
    MempoolOverflow,

    #[error("nothing to propose: mempool is empty")]
    NothingToPropose,

    #[error("a proposal is already pending; waiting for ack")]
    WaitingForAck,

    #[error("right side must wait for a matching left j-observation before proposing a claim-only frame")]
    RightAwaitingLeftClaim,

    #[error("every mempool transaction failed validation")]
    TxValidationSkipped,

    #[error("encoded frame exceeds the maximum size")]
    FrameTooLarge,

    #[error("frame failed to encode")]
    FrameEncodingInvalid,

    #[error("signing oracle failed: {0}")]
    SigningFailed(SigningError),

    #[error("account identifiers are invalid")]
    InvalidAccountIdentifiers,

    #[error("failed to build dispute proof")]
    DisputeProofBuildFailed,

    #[error("frame chain is broken: prevFrameHash does not match our current frame")]
    FrameChainBroken,

    #[error("frame height {got} does not match expected {expected}")]
    FrameSequenceMismatch { expected: u64, got: u64 },

    #[error("frame application failed while executing its transactions")]
    FrameApplicationFailed,

    #[error("bilateral state mismatch between sender's claimed deltas and receiver's computation")]
    BilateralConsensusMismatch,

    #[error("sender's fullDeltaStates bilateral fields do not match receiver's computation (injection)")]
    BilateralStateInjection,

    #[error("recomputed stateHash does not match the frame's claimed stateHash")]
    FrameHashMismatch,

    #[error("frame structure is invalid: {0}")]
    InvalidFrameStructure(String),

    #[error("hanko signature is invalid")]
    InvalidHankoSignature,

    #[error("ack's recovered entity does not match proofHeader.toEntity")]
    AckEntityMismatch,

    #[error("ack does not match any pending frame")]
    UnmatchedAck,

    #[error("right side rolled back its pending frame in favor of left's proposal")]
    RightSideRollback,

    #[error("account is halted after a fatal error; requires operator reset")]
    AccountHalted,

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl ConsensusError {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsensusError::Fatal(_))
    }
}
