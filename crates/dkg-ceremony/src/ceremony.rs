//! Ceremony command surface
//!
//! [`Ceremony`] owns one versioned [`CeremonyState`]. Every command runs
//! against a copy of the state and replaces the live state only if it
//! succeeds, so a rejected command has no effect at all. The external round
//! counter is passed into every command.

use crate::commitments::{Commitment, CommitmentStore};
use crate::complaint::{
    Assessment, Complaint, ComplaintContext, ComplaintEngine, ComplaintKind, ComplaintRecord,
    DisputeClosure, DisputeResolver, DisputeSession, Verdict,
};
use crate::curve::{Bls12381, CurveBackend};
use crate::ledger::{PayoutReason, Settlement, SlashingLedger};
use crate::phase::{Event, Phase, PhaseController, Transition};
use crate::registry::{Participant, ParticipantRegistry};
use crate::signature::{EcdsaVerifier, SignatureVerifier};
use crate::types::{
    Address, Amount, CeremonyConfig, ComplaintId, Digest, EncryptedShare, G1Point, G2Point,
    ParticipantIndex, Round,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Everything the ceremony knows, as one serializable value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeremonyState {
    config: CeremonyConfig,
    version: u64,
    phase: PhaseController,
    registry: ParticipantRegistry,
    store: CommitmentStore,
    ledger: SlashingLedger,
    complaints: Vec<ComplaintRecord>,
    disputes: Vec<DisputeSession>,
}

impl CeremonyState {
    fn new(config: CeremonyConfig, round: Round) -> Self {
        Self {
            phase: PhaseController::new(config.timeouts.clone(), round),
            registry: ParticipantRegistry::new(config.n, config.deposit),
            store: CommitmentStore::new(config.n, config.t),
            ledger: SlashingLedger::new(),
            complaints: Vec::new(),
            disputes: Vec::new(),
            version: 0,
            config,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn config(&self) -> &CeremonyConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn open_dispute_position(&self) -> Option<usize> {
        self.disputes.iter().position(|session| {
            self.complaints
                .iter()
                .any(|c| c.id == session.complaint_id && !c.resolved)
        })
    }

    fn open_dispute(&self) -> Result<&DisputeSession> {
        self.open_dispute_position()
            .map(|i| &self.disputes[i])
            .ok_or(Error::NoOpenDispute)
    }

    fn open_dispute_mut(&mut self) -> Result<&mut DisputeSession> {
        let position = self.open_dispute_position().ok_or(Error::NoOpenDispute)?;
        Ok(&mut self.disputes[position])
    }

    fn record_mut(&mut self, id: ComplaintId) -> Result<&mut ComplaintRecord> {
        self.complaints
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::Internal(format!("Complaint {id} has no record")))
    }

    /// Mirror a ledger settlement into the participant flags
    fn apply_settlement(&mut self, settlement: &Settlement) -> Result<()> {
        for index in &settlement.slashed {
            self.registry.mark_slashed(*index)?;
        }
        for payout in &settlement.payouts {
            if payout.reason == PayoutReason::Refund {
                self.registry.mark_refunded(payout.recipient)?;
            }
        }
        Ok(())
    }

    /// Settle a verdict, close its complaint record and end the ceremony
    fn conclude(
        &mut self,
        complaint_id: ComplaintId,
        verdict: Verdict,
        settlement: Settlement,
        event: Event,
        round: Round,
    ) -> Result<VerdictOutcome> {
        self.apply_settlement(&settlement)?;
        let record = self.record_mut(complaint_id)?;
        record.resolve(verdict);
        let guilty = verdict.guilty(record.challenger, record.accused);
        self.phase.advance(event, round)?;

        warn!(complaint_id, ?verdict, guilty, "Participant slashed");
        Ok(VerdictOutcome {
            complaint_id,
            verdict,
            guilty,
            settlement,
        })
    }
}

/// A final verdict and the deposits it moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictOutcome {
    pub complaint_id: ComplaintId,
    pub verdict: Verdict,
    pub guilty: ParticipantIndex,
    pub settlement: Settlement,
}

/// What raising a complaint led to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintOutcome {
    /// Decided on the spot
    Settled(VerdictOutcome),
    /// An interactive dispute is now running
    DisputeOpened { complaint_id: ComplaintId },
}

/// A DKG ceremony driven by externally ordered commands
pub struct Ceremony<B = Bls12381, V = EcdsaVerifier> {
    backend: B,
    verifier: V,
    state: CeremonyState,
}

impl Ceremony<Bls12381, EcdsaVerifier> {
    /// Start a ceremony over BLS12-381 with secp256k1 identities
    pub fn new(config: CeremonyConfig, round: Round) -> Result<Self> {
        Self::with_backends(config, Bls12381, EcdsaVerifier, round)
    }
}

impl<B: CurveBackend, V: SignatureVerifier> Ceremony<B, V> {
    /// Start a ceremony with explicit curve and signature backends
    pub fn with_backends(
        config: CeremonyConfig,
        backend: B,
        verifier: V,
        round: Round,
    ) -> Result<Self> {
        config.validate()?;
        info!(n = config.n, t = config.t, deposit = %config.deposit, round, "Ceremony started");
        Ok(Self {
            backend,
            verifier,
            state: CeremonyState::new(config, round),
        })
    }

    /// Resume from a snapshot
    pub fn restore(state: CeremonyState, backend: B, verifier: V) -> Result<Self> {
        state.config.validate()?;
        Ok(Self {
            backend,
            verifier,
            state,
        })
    }

    /// Run `command` on a copy of the state; keep the copy only on success
    fn transact<T>(
        &mut self,
        command: impl FnOnce(&B, &V, &mut CeremonyState) -> Result<T>,
    ) -> Result<T> {
        let mut next = self.state.clone();
        let output = command(&self.backend, &self.verifier, &mut next)?;
        next.version += 1;
        self.state = next;
        Ok(output)
    }

    /// Join the ceremony, escrowing `deposit`
    #[instrument(skip(self, encryption_key, commitment_digest), fields(caller = %caller))]
    pub fn enroll(
        &mut self,
        caller: Address,
        encryption_key: G1Point,
        commitment_digest: Digest,
        deposit: Amount,
        round: Round,
    ) -> Result<ParticipantIndex> {
        self.transact(|backend, _, state| {
            state.phase.ensure("enroll", Phase::Enrollment)?;
            if !backend.g1_is_member(&encryption_key) {
                return Err(Error::MalformedSubmission(
                    "Encryption key is not a G1 element".into(),
                ));
            }

            let index = state
                .registry
                .enroll(caller, encryption_key, commitment_digest, deposit, round)?;
            state.ledger.escrow(index, deposit)?;
            info!(index, "Participant enrolled");

            if state.registry.is_full() {
                state.phase.advance(Event::EnrollmentQuotaReached, round)?;
            }
            Ok(index)
        })
    }

    /// Post the commitments and encrypted shares of participant `index`
    #[instrument(skip(self, g1, g2, shares), fields(caller = %caller))]
    pub fn submit_commitment(
        &mut self,
        caller: Address,
        index: ParticipantIndex,
        g1: Vec<G1Point>,
        g2: Vec<G2Point>,
        shares: Vec<EncryptedShare>,
        round: Round,
    ) -> Result<()> {
        self.transact(|_, _, state| {
            state.phase.ensure("submit commitment", Phase::PostEnrollment)?;
            let digest = state.registry.require_identity(index, &caller)?.commitment_digest;

            state.store.submit(index, g1, g2, shares, &digest, round)?;
            state.registry.mark_committed(index)?;
            info!(index, committed = state.store.len(), "Commitment accepted");

            if state.registry.all_committed() {
                state.phase.advance(Event::CommitQuotaReached, round)?;
            }
            Ok(())
        })
    }

    /// Fix the group public key
    #[instrument(skip(self, point), fields(caller = %caller))]
    pub fn submit_group_public_key(
        &mut self,
        caller: Address,
        point: G2Point,
        submitter: ParticipantIndex,
        round: Round,
    ) -> Result<()> {
        self.transact(|backend, _, state| {
            state
                .phase
                .ensure("submit group public key", Phase::AllDataValid)?;
            state.registry.require_identity(submitter, &caller)?;
            if !state.registry.all_committed() {
                return Err(Error::InvalidProof("Not every participant committed".into()));
            }
            if let Some(open) = state.complaints.iter().find(|c| !c.resolved) {
                return Err(Error::InvalidProof(format!(
                    "Complaint {} is unresolved",
                    open.id
                )));
            }

            state.store.set_group_public_key(backend, point)?;
            state.phase.advance(Event::GroupKeySubmitted, round)?;
            info!(submitter, "Group public key set");
            Ok(())
        })
    }

    /// Raise a complaint on behalf of its challenger
    #[instrument(skip(self, complaint), fields(caller = %caller, kind = ?complaint.kind()))]
    pub fn raise_complaint(
        &mut self,
        caller: Address,
        complaint: Complaint,
        round: Round,
    ) -> Result<ComplaintOutcome> {
        self.transact(|backend, _, state| {
            let challenger = complaint.challenger();
            let accused = complaint.accused();
            if let Ok(open) = state.open_dispute() {
                if open.challenger == challenger && open.accused == accused {
                    return Err(Error::SessionAlreadyOpen {
                        challenger,
                        accused,
                    });
                }
            }

            state.phase.ensure_any(
                "raise complaint",
                &[Phase::PostEnrollment, Phase::AllDataReceived],
            )?;
            state.registry.require_identity(challenger, &caller)?;

            let phase = state.phase.phase();
            let ctx = ComplaintContext {
                phase,
                round,
                commit_deadline: state.phase.deadline(),
            };
            let assessment = ComplaintEngine::new(
                backend,
                &state.registry,
                &state.store,
                state.config.t,
            )
            .assess(&complaint, ctx)?;

            let complaint_id = state.complaints.len() as ComplaintId + 1;
            state
                .complaints
                .push(ComplaintRecord::new(complaint_id, &complaint, round));
            info!(complaint_id, challenger, accused, "Complaint raised");

            match assessment {
                Assessment::Verdict(verdict) => {
                    let settlement = if complaint.kind() == ComplaintKind::MissingData
                        && phase == Phase::PostEnrollment
                    {
                        let committed = state.registry.committed();
                        state
                            .ledger
                            .apply_missing_data_verdict(complaint_id, &committed)?
                    } else {
                        let guilty = verdict.guilty(challenger, accused);
                        state.ledger.apply_verdict(complaint_id, guilty)?
                    };
                    let outcome = state.conclude(
                        complaint_id,
                        verdict,
                        settlement,
                        Event::VerdictApplied,
                        round,
                    )?;
                    Ok(ComplaintOutcome::Settled(outcome))
                }
                Assessment::OpenDispute => {
                    state.disputes.push(DisputeSession::open(
                        complaint_id,
                        challenger,
                        accused,
                        state.config.t,
                        round,
                    ));
                    state.phase.advance(Event::ComplaintRaised, round)?;
                    info!(complaint_id, "Dispute opened");
                    Ok(ComplaintOutcome::DisputeOpened { complaint_id })
                }
            }
        })
    }

    /// Accused posts its aggregate for the current dispute round
    #[instrument(skip(self, value), fields(caller = %caller))]
    pub fn dispute_accused_turn(
        &mut self,
        caller: Address,
        value: G1Point,
        round: Round,
    ) -> Result<()> {
        self.transact(|_, _, state| {
            state.phase.ensure("dispute accused turn", Phase::Complaint)?;
            let accused = state.open_dispute()?.accused;
            state.registry.require_identity(accused, &caller)?;
            state.open_dispute_mut()?.accused_turn(value, round)
        })
    }

    /// Challenger agrees or disagrees with the posted aggregate
    #[instrument(skip(self), fields(caller = %caller))]
    pub fn dispute_challenger_turn(
        &mut self,
        caller: Address,
        agree: bool,
        round: Round,
    ) -> Result<()> {
        self.transact(|_, _, state| {
            state
                .phase
                .ensure("dispute challenger turn", Phase::Complaint)?;
            let challenger = state.open_dispute()?.challenger;
            state.registry.require_identity(challenger, &caller)?;
            state.open_dispute_mut()?.challenger_turn(agree, round)
        })
    }

    /// Challenger proves which side lied once the search converged
    #[instrument(skip(self, closure), fields(caller = %caller))]
    pub fn close_dispute(
        &mut self,
        caller: Address,
        closure: DisputeClosure,
        round: Round,
    ) -> Result<VerdictOutcome> {
        self.transact(|backend, verifier, state| {
            state.phase.ensure("close dispute", Phase::Complaint)?;
            let session = state.open_dispute()?.clone();
            state.registry.require_identity(session.challenger, &caller)?;

            let verdict = DisputeResolver::new(
                backend,
                verifier,
                &state.registry,
                &state.store,
                state.config.t,
            )
            .close(&session, &closure)?;

            let guilty = verdict.guilty(session.challenger, session.accused);
            let settlement = state.ledger.apply_verdict(session.complaint_id, guilty)?;
            state.conclude(
                session.complaint_id,
                verdict,
                settlement,
                Event::DisputeResolved,
                round,
            )
        })
    }

    /// Resolve the open dispute against the party that failed to move
    #[instrument(skip(self))]
    pub fn trigger_dispute_timeout(&mut self, round: Round) -> Result<VerdictOutcome> {
        self.transact(|_, _, state| {
            state.phase.ensure("dispute timeout", Phase::Complaint)?;
            let session = state.open_dispute()?.clone();
            let deadline = session.deadline(state.config.timeouts.dispute_turn);
            if round <= deadline {
                return Err(Error::QuotaNotMet { deadline, round });
            }

            let verdict = session.default_verdict();
            let silent = session.silent_party();
            let settlement = state.ledger.apply_verdict(session.complaint_id, silent)?;
            state.conclude(
                session.complaint_id,
                verdict,
                settlement,
                Event::DisputeResolved,
                round,
            )
        })
    }

    /// End an enrollment that never filled up; everyone is refunded
    #[instrument(skip(self))]
    pub fn trigger_enrollment_timeout(&mut self, round: Round) -> Result<Settlement> {
        self.transact(|_, _, state| {
            state.phase.advance(Event::EnrollmentTimeout, round)?;
            let settlement = state.ledger.refund_all();
            state.apply_settlement(&settlement)?;
            info!(enrolled = state.registry.len(), "Enrollment timed out");
            Ok(settlement)
        })
    }

    /// End a commit phase that never completed; non-committers forfeit
    #[instrument(skip(self))]
    pub fn trigger_commit_timeout(&mut self, round: Round) -> Result<Settlement> {
        self.transact(|_, _, state| {
            state.phase.advance(Event::CommitTimeout, round)?;
            let committed = state.registry.committed();
            let settlement = state.ledger.forfeit_missing(&committed)?;
            state.apply_settlement(&settlement)?;
            info!(slashed = ?settlement.slashed, "Commit phase timed out");
            Ok(settlement)
        })
    }

    /// Close the complaint window; the posted data is accepted as valid
    #[instrument(skip(self))]
    pub fn trigger_complaint_window_timeout(&mut self, round: Round) -> Result<()> {
        self.transact(|_, _, state| {
            state.phase.advance(Event::ComplaintWindowClosed, round)?;
            Ok(())
        })
    }

    /// Finish the ceremony and refund every deposit
    ///
    /// Ends in `EndSuccess` if the group key was posted, else in `EndFail`.
    #[instrument(skip(self))]
    pub fn trigger_finalization_timeout(&mut self, round: Round) -> Result<Settlement> {
        self.transact(|_, _, state| {
            let phase = state.phase.advance(Event::FinalizeTimeout, round)?;
            let settlement = state.ledger.refund_all();
            state.apply_settlement(&settlement)?;
            info!(?phase, "Ceremony finalized");
            Ok(settlement)
        })
    }

    pub fn phase(&self) -> Phase {
        self.state.phase.phase()
    }

    /// Deadline of the current phase, if it has one
    pub fn deadline(&self) -> Option<Round> {
        self.state.phase.deadline()
    }

    pub fn config(&self) -> &CeremonyConfig {
        &self.state.config
    }

    pub fn participant(&self, index: ParticipantIndex) -> Result<&Participant> {
        self.state.registry.get(index)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.state.registry.iter()
    }

    pub fn commitment(&self, index: ParticipantIndex) -> Option<&Commitment> {
        self.state.store.get(index)
    }

    /// The dispute currently running, if any
    pub fn dispute(&self) -> Option<&DisputeSession> {
        self.state.open_dispute().ok()
    }

    /// Every dispute ever opened, closed ones included
    pub fn disputes(&self) -> &[DisputeSession] {
        &self.state.disputes
    }

    pub fn complaints(&self) -> &[ComplaintRecord] {
        &self.state.complaints
    }

    pub fn group_public_key(&self) -> Option<&G2Point> {
        self.state.store.group_public_key()
    }

    /// Group key implied by the posted commitments
    pub fn expected_group_public_key(&self) -> Option<G2Point> {
        self.state.store.aggregate_group_key(&self.backend)
    }

    pub fn ledger(&self) -> &SlashingLedger {
        &self.state.ledger
    }

    /// Phase transitions so far
    pub fn history(&self) -> &[Transition] {
        self.state.phase.history()
    }

    /// Number of successful commands
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Current state, for persistence or inspection
    pub fn snapshot(&self) -> &CeremonyState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dealer::Dealer;
    use crate::types::Timeouts;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn config() -> CeremonyConfig {
        CeremonyConfig::new(2, 0, 100).unwrap().with_timeouts(Timeouts {
            enrollment: 5,
            commit: 5,
            complaint_window: 5,
            finalization: 5,
            dispute_turn: 5,
        })
    }

    #[test]
    fn test_failed_command_leaves_state_untouched() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(41);
        let dealer = Dealer::new(&backend, 0, &mut rng).unwrap();
        let mut ceremony = Ceremony::new(config(), 0).unwrap();

        let before = ceremony.snapshot().to_json().unwrap();
        let result = ceremony.enroll(
            dealer.identity(),
            dealer.encryption_key().clone(),
            dealer.commitment_digest(),
            99,
            1,
        );
        assert!(matches!(result, Err(Error::IncorrectDeposit { .. })));
        assert_eq!(ceremony.version(), 0);
        assert_eq!(ceremony.snapshot().to_json().unwrap(), before);

        ceremony
            .enroll(
                dealer.identity(),
                dealer.encryption_key().clone(),
                dealer.commitment_digest(),
                100,
                1,
            )
            .unwrap();
        assert_eq!(ceremony.version(), 1);
    }

    #[test]
    fn test_rejects_invalid_encryption_key() {
        let mut ceremony = Ceremony::new(config(), 0).unwrap();
        assert!(matches!(
            ceremony.enroll(Address([1; 20]), G1Point(vec![0; 48]), [0; 32], 100, 1),
            Err(Error::MalformedSubmission(_))
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let dealer = Dealer::new(&backend, 0, &mut rng).unwrap();
        let mut ceremony = Ceremony::new(config(), 0).unwrap();
        ceremony
            .enroll(
                dealer.identity(),
                dealer.encryption_key().clone(),
                dealer.commitment_digest(),
                100,
                1,
            )
            .unwrap();

        let json = ceremony.snapshot().to_json().unwrap();
        let state = CeremonyState::from_json(&json).unwrap();
        let restored = Ceremony::restore(state, Bls12381, EcdsaVerifier).unwrap();
        assert_eq!(restored.version(), 1);
        assert_eq!(restored.participant(1).unwrap().identity, dealer.identity());
        assert_eq!(restored.ledger().balance(), 100);
    }

    #[test]
    fn test_dispute_commands_need_a_dispute() {
        let mut ceremony = Ceremony::new(config(), 0).unwrap();
        assert!(matches!(
            ceremony.dispute_challenger_turn(Address([1; 20]), true, 1),
            Err(Error::PhaseViolation { .. })
        ));
        assert!(matches!(
            ceremony.trigger_dispute_timeout(100),
            Err(Error::PhaseViolation { .. })
        ));
        assert!(ceremony.dispute().is_none());
    }
}
