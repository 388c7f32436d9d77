//! Complaint validation
//!
//! A complaint names a challenger and an accused. Single-shot complaints are
//! decided from posted data in one call: either the accused's data is
//! provably wrong, or the complaint is baseless and the challenger pays for
//! it. Missing-data complaints against a participant that did post its data
//! open an interactive [`dispute`] instead.

pub mod dispute;

use crate::commitments::{CommitmentStore, Group};
use crate::curve::{evaluate_commitment, g1_base_mul, CurveBackend};
use crate::encryption::decrypt_share;
use crate::phase::Phase;
use crate::registry::{Participant, ParticipantRegistry};
use crate::types::{ComplaintId, EncryptedShare, G1Point, ParticipantIndex, Round, Scalar};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use dispute::{DisputeClosure, DisputeResolver, DisputeSession, DisputeTurn};

/// Kind of a raised complaint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintKind {
    PrivateCommitmentMismatch,
    PublicCommitmentMismatch,
    PointNotInGroup,
    MissingData,
}

/// A complaint with its proof arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complaint {
    /// The accused's share for the challenger does not match its polynomial
    ///
    /// The challenger reveals its decryption key so anyone can decrypt.
    PrivateCommitmentMismatch {
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
        decryption_key: Scalar,
    },
    /// The accused's G1 and G2 commitments to one coefficient differ
    PublicCommitmentMismatch {
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
        coefficient: usize,
    },
    /// One of the accused's posted points is not a group element
    PointNotInGroup {
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
        group: Group,
        coefficient: usize,
    },
    /// The accused's data is missing or incomplete
    MissingData {
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
    },
}

impl Complaint {
    pub fn challenger(&self) -> ParticipantIndex {
        match self {
            Complaint::PrivateCommitmentMismatch { challenger, .. }
            | Complaint::PublicCommitmentMismatch { challenger, .. }
            | Complaint::PointNotInGroup { challenger, .. }
            | Complaint::MissingData { challenger, .. } => *challenger,
        }
    }

    pub fn accused(&self) -> ParticipantIndex {
        match self {
            Complaint::PrivateCommitmentMismatch { accused, .. }
            | Complaint::PublicCommitmentMismatch { accused, .. }
            | Complaint::PointNotInGroup { accused, .. }
            | Complaint::MissingData { accused, .. } => *accused,
        }
    }

    pub fn kind(&self) -> ComplaintKind {
        match self {
            Complaint::PrivateCommitmentMismatch { .. } => ComplaintKind::PrivateCommitmentMismatch,
            Complaint::PublicCommitmentMismatch { .. } => ComplaintKind::PublicCommitmentMismatch,
            Complaint::PointNotInGroup { .. } => ComplaintKind::PointNotInGroup,
            Complaint::MissingData { .. } => ComplaintKind::MissingData,
        }
    }
}

/// Who lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    AccusedGuilty,
    ChallengerGuilty,
}

impl Verdict {
    /// Index of the losing party
    pub fn guilty(self, challenger: ParticipantIndex, accused: ParticipantIndex) -> ParticipantIndex {
        match self {
            Verdict::AccusedGuilty => accused,
            Verdict::ChallengerGuilty => challenger,
        }
    }
}

/// Audit record of a raised complaint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub id: ComplaintId,
    pub challenger: ParticipantIndex,
    pub accused: ParticipantIndex,
    pub kind: ComplaintKind,
    pub resolved: bool,
    pub verdict: Option<Verdict>,
    pub raised_at: Round,
}

impl ComplaintRecord {
    pub fn new(id: ComplaintId, complaint: &Complaint, raised_at: Round) -> Self {
        Self {
            id,
            challenger: complaint.challenger(),
            accused: complaint.accused(),
            kind: complaint.kind(),
            resolved: false,
            verdict: None,
            raised_at,
        }
    }

    /// Record the final verdict
    pub fn resolve(&mut self, verdict: Verdict) {
        self.resolved = true;
        self.verdict = Some(verdict);
    }
}

/// Result of assessing a complaint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    /// Decided on the spot
    Verdict(Verdict),
    /// Needs an interactive dispute
    OpenDispute,
}

/// Where the ceremony stands when a complaint arrives
#[derive(Debug, Clone, Copy)]
pub struct ComplaintContext {
    pub phase: Phase,
    pub round: Round,
    /// Commit deadline, while the commit phase is running
    pub commit_deadline: Option<Round>,
}

/// Validates complaints against the registry and the posted commitments
pub struct ComplaintEngine<'a, B: CurveBackend + ?Sized> {
    backend: &'a B,
    registry: &'a ParticipantRegistry,
    store: &'a CommitmentStore,
    t: usize,
}

impl<'a, B: CurveBackend + ?Sized> ComplaintEngine<'a, B> {
    pub fn new(
        backend: &'a B,
        registry: &'a ParticipantRegistry,
        store: &'a CommitmentStore,
        t: usize,
    ) -> Self {
        Self {
            backend,
            registry,
            store,
            t,
        }
    }

    /// Decide a complaint, or report that it needs a dispute
    pub fn assess(&self, complaint: &Complaint, ctx: ComplaintContext) -> Result<Assessment> {
        let (challenger, accused) = self.parties(complaint)?;

        let assessment = match (complaint, ctx.phase) {
            (Complaint::MissingData { .. }, Phase::PostEnrollment) => {
                self.missing_after_deadline(challenger, accused, ctx)?
            }
            (Complaint::MissingData { .. }, Phase::AllDataReceived) => Assessment::OpenDispute,
            (_, Phase::AllDataReceived) => {
                Assessment::Verdict(self.single_shot(complaint, challenger, accused)?)
            }
            (_, phase) => {
                return Err(Error::PhaseViolation {
                    action: "raise complaint",
                    phase,
                })
            }
        };

        debug!(
            challenger = challenger.index,
            accused = accused.index,
            kind = ?complaint.kind(),
            ?assessment,
            "Complaint assessed"
        );
        Ok(assessment)
    }

    fn parties(&self, complaint: &Complaint) -> Result<(&'a Participant, &'a Participant)> {
        let challenger = self.registry.get(complaint.challenger())?;
        let accused = self.registry.get(complaint.accused())?;
        if challenger.index == accused.index {
            return Err(Error::InvalidProof(
                "A participant cannot accuse itself".into(),
            ));
        }
        for party in [challenger, accused] {
            if party.is_slashed {
                return Err(Error::AlreadySlashed(format!("participant {}", party.index)));
            }
        }
        Ok((challenger, accused))
    }

    fn missing_after_deadline(
        &self,
        challenger: &Participant,
        accused: &Participant,
        ctx: ComplaintContext,
    ) -> Result<Assessment> {
        let deadline = ctx
            .commit_deadline
            .ok_or_else(|| Error::Internal("Commit phase without a deadline".into()))?;
        if ctx.round <= deadline {
            return Err(Error::QuotaNotMet {
                deadline,
                round: ctx.round,
            });
        }
        if accused.has_committed {
            return Err(Error::InvalidProof(format!(
                "Participant {} posted its commitment",
                accused.index
            )));
        }
        if !challenger.has_committed {
            return Err(Error::InvalidProof(format!(
                "Participant {} did not post its own commitment",
                challenger.index
            )));
        }
        Ok(Assessment::Verdict(Verdict::AccusedGuilty))
    }

    fn single_shot(
        &self,
        complaint: &Complaint,
        challenger: &Participant,
        accused: &Participant,
    ) -> Result<Verdict> {
        let commitment = self.store.get(accused.index).ok_or_else(|| {
            Error::InvalidProof(format!("Participant {} has no commitment", accused.index))
        })?;

        let valid = match complaint {
            Complaint::PrivateCommitmentMismatch { decryption_key, .. } => {
                check_decryption_key(self.backend, challenger, decryption_key)?;
                self.share_is_consistent(
                    &commitment.g1,
                    commitment.share_for(challenger.index).copied(),
                    decryption_key,
                    &accused.encryption_key,
                    challenger.index,
                )
            }
            Complaint::PublicCommitmentMismatch { coefficient, .. } => {
                let k = self.coefficient(*coefficient)?;
                match (commitment.g1.get(k), commitment.g2.get(k)) {
                    (Some(g1), Some(g2)) => self.backend.pairing_matches(g1, g2),
                    _ => {
                        return Err(Error::MalformedSubmission(
                            "Commitment is shorter than its degree".into(),
                        ))
                    }
                }
            }
            Complaint::PointNotInGroup {
                group, coefficient, ..
            } => {
                let k = self.coefficient(*coefficient)?;
                match group {
                    Group::G1 => commitment.g1.get(k).map(|p| self.backend.g1_is_member(p)),
                    Group::G2 => commitment.g2.get(k).map(|p| self.backend.g2_is_member(p)),
                }
                .ok_or_else(|| {
                    Error::MalformedSubmission("Commitment is shorter than its degree".into())
                })?
            }
            Complaint::MissingData { .. } => {
                return Err(Error::Internal("Missing data is not single-shot".into()))
            }
        };

        Ok(if valid {
            Verdict::ChallengerGuilty
        } else {
            Verdict::AccusedGuilty
        })
    }

    /// Decrypted share lies on the committed polynomial at `recipient`
    ///
    /// Any failure to decode the accused's data counts against it.
    fn share_is_consistent(
        &self,
        g1: &[G1Point],
        encrypted: Option<EncryptedShare>,
        recipient_secret: &Scalar,
        dealer_key: &G1Point,
        recipient: ParticipantIndex,
    ) -> bool {
        let Some(encrypted) = encrypted else {
            return false;
        };
        let Some(share) = decrypt_share(self.backend, &encrypted, recipient_secret, dealer_key)
        else {
            return false;
        };
        if !self.backend.scalar_is_canonical(&share) {
            return false;
        }
        match (
            g1_base_mul(self.backend, &share),
            evaluate_commitment(self.backend, g1, recipient as u64),
        ) {
            (Some(actual), Some(expected)) => self.backend.g1_equal(&actual, &expected),
            _ => false,
        }
    }

    fn coefficient(&self, k: usize) -> Result<usize> {
        if k > self.t {
            return Err(Error::InvalidProof(format!(
                "Coefficient {k} is beyond degree {}",
                self.t
            )));
        }
        Ok(k)
    }
}

/// Fail with `InvalidProof` unless `secret` belongs to the participant's
/// registered encryption key
pub(crate) fn check_decryption_key<B: CurveBackend + ?Sized>(
    backend: &B,
    participant: &Participant,
    secret: &Scalar,
) -> Result<()> {
    let matches = backend.scalar_is_canonical(secret)
        && g1_base_mul(backend, secret)
            .map(|key| backend.g1_equal(&key, &participant.encryption_key))
            .unwrap_or(false);
    if !matches {
        return Err(Error::InvalidProof(format!(
            "Decryption key does not match the key of participant {}",
            participant.index
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitments::Commitment;
    use crate::curve::Bls12381;
    use crate::encryption::encrypt_share;
    use crate::types::Address;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const T: usize = 1;
    const N: usize = 3;

    struct Fixture {
        backend: Bls12381,
        secrets: Vec<Scalar>,
        registry: ParticipantRegistry,
        store: CommitmentStore,
    }

    fn ctx() -> ComplaintContext {
        ComplaintContext {
            phase: Phase::AllDataReceived,
            round: 10,
            commit_deadline: None,
        }
    }

    /// Every participant deals honestly except where `tamper` rewrites the
    /// commitment before it is posted
    fn fixture(seed: u64, tamper: impl Fn(ParticipantIndex, &mut Commitment)) -> Fixture {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let secrets: Vec<Scalar> = (0..N).map(|_| backend.random_scalar(&mut rng)).collect();
        let keys: Vec<G1Point> = secrets
            .iter()
            .map(|s| g1_base_mul(&backend, s).unwrap())
            .collect();

        let mut registry = ParticipantRegistry::new(N, 10);
        let mut commitments = Vec::new();
        for dealer in 1..=N {
            let coefficients: Vec<Scalar> =
                (0..=T).map(|_| backend.random_scalar(&mut rng)).collect();
            let g1: Vec<G1Point> = coefficients
                .iter()
                .map(|c| g1_base_mul(&backend, c).unwrap())
                .collect();
            let g2 = coefficients
                .iter()
                .map(|c| crate::curve::g2_base_mul(&backend, c).unwrap())
                .collect();
            let shares = (1..=N)
                .map(|j| {
                    let share =
                        crate::curve::evaluate_polynomial(&backend, &coefficients, j as u64)
                            .unwrap();
                    encrypt_share(&backend, &share, &secrets[dealer - 1], &keys[j - 1]).unwrap()
                })
                .collect();
            let mut commitment = Commitment {
                g1,
                g2,
                shares,
                submitted_at: 1,
            };
            tamper(dealer, &mut commitment);
            let digest = Commitment::digest(&commitment.g1, &commitment.g2);
            registry
                .enroll(
                    Address([dealer as u8; 20]),
                    keys[dealer - 1].clone(),
                    digest,
                    10,
                    0,
                )
                .unwrap();
            commitments.push(commitment);
        }

        let mut store = CommitmentStore::new(N, T);
        for (i, c) in commitments.into_iter().enumerate() {
            let index = i + 1;
            let digest = registry.get(index).unwrap().commitment_digest;
            store.submit(index, c.g1, c.g2, c.shares, &digest, 1).unwrap();
            registry.mark_committed(index).unwrap();
        }

        Fixture {
            backend,
            secrets,
            registry,
            store,
        }
    }

    impl Fixture {
        fn engine(&self) -> ComplaintEngine<'_, Bls12381> {
            ComplaintEngine::new(&self.backend, &self.registry, &self.store, T)
        }
    }

    #[test]
    fn test_private_mismatch_against_honest_dealer() {
        let f = fixture(21, |_, _| {});
        let complaint = Complaint::PrivateCommitmentMismatch {
            challenger: 1,
            accused: 2,
            decryption_key: f.secrets[0].clone(),
        };
        assert_eq!(
            f.engine().assess(&complaint, ctx()),
            Ok(Assessment::Verdict(Verdict::ChallengerGuilty))
        );
    }

    #[test]
    fn test_private_mismatch_against_bad_share() {
        let f = fixture(22, |dealer, c| {
            if dealer == 2 {
                c.shares[0] = EncryptedShare([7u8; 32]);
            }
        });
        let complaint = Complaint::PrivateCommitmentMismatch {
            challenger: 1,
            accused: 2,
            decryption_key: f.secrets[0].clone(),
        };
        assert_eq!(
            f.engine().assess(&complaint, ctx()),
            Ok(Assessment::Verdict(Verdict::AccusedGuilty))
        );
    }

    #[test]
    fn test_private_mismatch_with_foreign_key() {
        let f = fixture(23, |_, _| {});
        let complaint = Complaint::PrivateCommitmentMismatch {
            challenger: 1,
            accused: 2,
            decryption_key: f.secrets[2].clone(),
        };
        assert!(matches!(
            f.engine().assess(&complaint, ctx()),
            Err(Error::InvalidProof(_))
        ));
    }

    #[test]
    fn test_public_mismatch() {
        let f = fixture(24, |dealer, c| {
            if dealer == 3 {
                c.g2[1] = Bls12381.g2_generator();
            }
        });
        let engine = f.engine();
        let against_honest = Complaint::PublicCommitmentMismatch {
            challenger: 1,
            accused: 2,
            coefficient: 1,
        };
        assert_eq!(
            engine.assess(&against_honest, ctx()),
            Ok(Assessment::Verdict(Verdict::ChallengerGuilty))
        );
        let against_cheater = Complaint::PublicCommitmentMismatch {
            challenger: 1,
            accused: 3,
            coefficient: 1,
        };
        assert_eq!(
            engine.assess(&against_cheater, ctx()),
            Ok(Assessment::Verdict(Verdict::AccusedGuilty))
        );
        let beyond_degree = Complaint::PublicCommitmentMismatch {
            challenger: 1,
            accused: 3,
            coefficient: 2,
        };
        assert!(matches!(
            engine.assess(&beyond_degree, ctx()),
            Err(Error::InvalidProof(_))
        ));
    }

    #[test]
    fn test_point_not_in_group() {
        let f = fixture(25, |dealer, c| {
            if dealer == 2 {
                c.g1[0] = G1Point(vec![0x13; 48]);
            }
        });
        let engine = f.engine();
        let complaint = |group| Complaint::PointNotInGroup {
            challenger: 3,
            accused: 2,
            group,
            coefficient: 0,
        };
        assert_eq!(
            engine.assess(&complaint(Group::G1), ctx()),
            Ok(Assessment::Verdict(Verdict::AccusedGuilty))
        );
        assert_eq!(
            engine.assess(&complaint(Group::G2), ctx()),
            Ok(Assessment::Verdict(Verdict::ChallengerGuilty))
        );
    }

    #[test]
    fn test_missing_data_opens_dispute() {
        let f = fixture(26, |_, _| {});
        let complaint = Complaint::MissingData {
            challenger: 1,
            accused: 2,
        };
        assert_eq!(
            f.engine().assess(&complaint, ctx()),
            Ok(Assessment::OpenDispute)
        );
    }

    #[test]
    fn test_party_checks() {
        let f = fixture(27, |_, _| {});
        let engine = f.engine();
        let own = Complaint::MissingData {
            challenger: 2,
            accused: 2,
        };
        assert!(matches!(engine.assess(&own, ctx()), Err(Error::InvalidProof(_))));
        let unknown = Complaint::MissingData {
            challenger: 1,
            accused: 9,
        };
        assert_eq!(
            engine.assess(&unknown, ctx()),
            Err(Error::UnknownParticipant(9))
        );
        let late = ComplaintContext {
            phase: Phase::AllDataValid,
            ..ctx()
        };
        assert!(matches!(
            engine.assess(&unknown, late),
            Err(Error::UnknownParticipant(9))
        ));
        let valid = Complaint::MissingData {
            challenger: 1,
            accused: 2,
        };
        assert!(matches!(
            engine.assess(&valid, late),
            Err(Error::PhaseViolation { .. })
        ));
    }
}
