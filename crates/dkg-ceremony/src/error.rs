//! Error types for ceremony commands
//!
//! Every command either applies completely or fails with one of these
//! variants and leaves the ceremony untouched.

use crate::phase::Phase;
use crate::types::ParticipantIndex;
use thiserror::Error;

/// Result type alias for ceremony operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a DKG ceremony
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Command invoked outside the phase that permits it
    #[error("Phase violation: {action} is not allowed in phase {phase:?}")]
    PhaseViolation { action: &'static str, phase: Phase },

    /// Timeout command invoked before its deadline
    #[error("Quota not met: deadline is round {deadline}, current round is {round}")]
    QuotaNotMet { deadline: u64, round: u64 },

    /// A complaint or dispute-closure proof failed verification
    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    /// A signature did not recover to the claimed signer
    #[error("Signature does not belong to participant {0}")]
    SignatureMismatch(ParticipantIndex),

    /// Identity already holds a participant slot
    #[error("Identity {0} is already enrolled")]
    DuplicateEnrollment(String),

    /// Participant or complaint has already been settled
    #[error("Already slashed: {0}")]
    AlreadySlashed(String),

    /// Index does not name an enrolled participant
    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantIndex),

    /// A dispute between the same two participants is still open
    #[error("Dispute already open between challenger {challenger} and accused {accused}")]
    SessionAlreadyOpen {
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
    },

    /// Invalid ceremony configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Attached deposit differs from the ceremony deposit
    #[error("Incorrect deposit: required {required}, got {actual}")]
    IncorrectDeposit { required: u128, actual: u128 },

    /// All participant slots are taken
    #[error("Registry full: capacity is {0}")]
    RegistryFull(usize),

    /// Submitted data has the wrong shape
    #[error("Malformed submission: {0}")]
    MalformedSubmission(String),

    /// Participant already posted its commitment
    #[error("Participant {0} already submitted a commitment")]
    DuplicateSubmission(ParticipantIndex),

    /// The group public key is already fixed
    #[error("Group public key already set")]
    GroupKeyAlreadySet,

    /// Caller is not the participant it acts for
    #[error("Caller is not authorized to act for participant {0}")]
    Unauthorized(ParticipantIndex),

    /// No dispute session is open
    #[error("No open dispute")]
    NoOpenDispute,

    /// Dispute command sent by the party whose turn it is not
    #[error("Out of turn: waiting for {expected}")]
    OutOfTurn { expected: &'static str },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
