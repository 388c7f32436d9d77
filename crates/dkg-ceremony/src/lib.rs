//! # DKG Ceremony
//!
//! Coordinator for a deposit-backed distributed key generation ceremony.
//!
//! `n` participants each deal a random degree-`t` polynomial, post Feldman
//! commitments to its coefficients (in both G1 and G2) and encrypt one share
//! to every other participant. Any `t + 1` shares reconstruct the group key;
//! nobody ever holds it.
//!
//! Honesty is enforced economically. Every participant escrows a deposit,
//! provably wrong data is punished by slashing it, and so are baseless
//! complaints. Disagreements that cannot be settled from posted data alone
//! are narrowed down by an interactive binary search over the commitment.
//!
//! ## Phases
//!
//! ```text
//! Enrollment -> PostEnrollment -> AllDataReceived -> AllDataValid -> PostGroupPk -> EndSuccess
//!                     |                  |                |
//!                     |              Complaint            |
//!                     v                  v                v
//!                                     EndFail
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use dkg_ceremony::{Ceremony, CeremonyConfig, Dealer};
//!
//! let mut ceremony = Ceremony::new(CeremonyConfig::new(3, 1, 1_000)?, 0)?;
//! let index = ceremony.enroll(
//!     dealer.identity(),
//!     dealer.encryption_key().clone(),
//!     dealer.commitment_digest(),
//!     1_000,
//!     round,
//! )?;
//! ```

pub mod ceremony;
pub mod commitments;
pub mod complaint;
pub mod curve;
pub mod dealer;
pub mod encryption;
pub mod error;
pub mod ledger;
pub mod phase;
pub mod registry;
pub mod signature;
pub mod types;

pub use ceremony::{Ceremony, CeremonyState, ComplaintOutcome, VerdictOutcome};
pub use complaint::{Complaint, DisputeClosure, DisputeTurn, Verdict};
pub use curve::{Bls12381, CurveBackend};
pub use dealer::Dealer;
pub use error::{Error, Result};
pub use phase::Phase;
pub use signature::{EcdsaVerifier, SignatureVerifier};
pub use types::{Address, CeremonyConfig, G1Point, G2Point, ParticipantIndex, Round, Timeouts};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default deposit, in the smallest ledger unit
pub const DEFAULT_DEPOSIT: types::Amount = 1_000;
