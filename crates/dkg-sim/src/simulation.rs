//! In-process ceremony driver
//!
//! Plays every participant of a ceremony with locally generated keys and
//! advances the round counter by one per command.

use anyhow::{anyhow, bail, Context, Result};
use dkg_ceremony::commitments::Commitment;
use dkg_ceremony::curve::prefix_evaluations;
use dkg_ceremony::ledger::PayoutReason;
use dkg_ceremony::types::{Amount, EncryptedShare};
use dkg_ceremony::{
    Bls12381, Ceremony, CeremonyConfig, Complaint, ComplaintOutcome, CurveBackend, Dealer,
    DisputeClosure, DisputeTurn, G1Point, ParticipantIndex, Phase, Round, VerdictOutcome,
};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::{debug, info};

pub struct Simulation {
    backend: Bls12381,
    ceremony: Ceremony,
    dealers: Vec<Dealer>,
    round: Round,
}

impl Simulation {
    pub fn new(config: CeremonyConfig, rng: &mut ChaCha20Rng) -> Result<Self> {
        let backend = Bls12381;
        let dealers = (0..config.n)
            .map(|_| Dealer::new(&backend, config.t, &mut *rng))
            .collect::<dkg_ceremony::Result<Vec<_>>>()?;
        let ceremony = Ceremony::new(config, 0)?;
        Ok(Self {
            backend,
            ceremony,
            dealers,
            round: 0,
        })
    }

    pub fn ceremony(&self) -> &Ceremony {
        &self.ceremony
    }

    fn dealer(&self, index: ParticipantIndex) -> Result<&Dealer> {
        index
            .checked_sub(1)
            .and_then(|i| self.dealers.get(i))
            .ok_or_else(|| anyhow!("No participant {index}"))
    }

    fn next_round(&mut self) -> Round {
        self.round += 1;
        self.round
    }

    /// Let the round counter run past the current phase deadline
    pub fn wait_for_deadline(&mut self) -> Round {
        if let Some(deadline) = self.ceremony.deadline() {
            self.round = self.round.max(deadline + 1);
        }
        self.round
    }

    pub fn enroll(&mut self, count: usize) -> Result<()> {
        let deposit = self.ceremony.config().deposit;
        for i in 1..=count {
            let round = self.next_round();
            let dealer = self.dealer(i)?;
            let index = self.ceremony.enroll(
                dealer.identity(),
                dealer.encryption_key().clone(),
                Commitment::digest(dealer.commitments_g1(), dealer.commitments_g2()),
                deposit,
                round,
            )?;
            debug!(index, round, "Enrolled");
        }
        Ok(())
    }

    /// Commit for every participant not in `skip`, corrupting the share
    /// `corrupt = (dealer, recipient)` if given
    pub fn commit(
        &mut self,
        skip: &[ParticipantIndex],
        corrupt: Option<(ParticipantIndex, ParticipantIndex)>,
    ) -> Result<()> {
        let keys: Vec<G1Point> = self
            .dealers
            .iter()
            .map(|d| d.encryption_key().clone())
            .collect();

        for index in 1..=self.dealers.len() {
            if skip.contains(&index) {
                continue;
            }
            let dealer = self.dealer(index)?;
            let mut shares: Vec<EncryptedShare> = dealer.encrypted_shares(&self.backend, &keys)?;
            if let Some((bad_dealer, recipient)) = corrupt {
                if bad_dealer == index {
                    let share = recipient
                        .checked_sub(1)
                        .and_then(|i| shares.get_mut(i))
                        .context("Corrupted recipient out of range")?;
                    share.0[31] ^= 0x01;
                    info!(dealer = index, recipient, "Dealing a corrupted share");
                }
            }
            let caller = dealer.identity();
            let g1 = dealer.commitments_g1().to_vec();
            let g2 = dealer.commitments_g2().to_vec();

            let round = self.next_round();
            self.ceremony
                .submit_commitment(caller, index, g1, g2, shares, round)?;
        }
        Ok(())
    }

    pub fn close_complaint_window(&mut self) -> Result<()> {
        let round = self.wait_for_deadline();
        self.ceremony.trigger_complaint_window_timeout(round)?;
        Ok(())
    }

    pub fn submit_group_key(&mut self, submitter: ParticipantIndex) -> Result<()> {
        let key = self
            .ceremony
            .expected_group_public_key()
            .context("Group key cannot be derived")?;
        let caller = self.dealer(submitter)?.identity();
        let round = self.next_round();
        self.ceremony
            .submit_group_public_key(caller, key, submitter, round)?;
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<()> {
        let round = self.wait_for_deadline();
        self.ceremony.trigger_finalization_timeout(round)?;
        Ok(())
    }

    pub fn enrollment_timeout(&mut self) -> Result<()> {
        let round = self.wait_for_deadline();
        self.ceremony.trigger_enrollment_timeout(round)?;
        Ok(())
    }

    pub fn commit_timeout(&mut self) -> Result<()> {
        let round = self.wait_for_deadline();
        self.ceremony.trigger_commit_timeout(round)?;
        Ok(())
    }

    pub fn private_complaint(
        &mut self,
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
    ) -> Result<ComplaintOutcome> {
        let dealer = self.dealer(challenger)?;
        let caller = dealer.identity();
        let complaint = Complaint::PrivateCommitmentMismatch {
            challenger,
            accused,
            decryption_key: dealer.decryption_key().clone(),
        };
        let round = self.next_round();
        Ok(self.ceremony.raise_complaint(caller, complaint, round)?)
    }

    /// Run a full interactive dispute
    ///
    /// The accused reveals its true aggregates below `falsify_from` and a
    /// forged point from there on. The challenger agrees exactly with the
    /// true values.
    pub fn dispute(
        &mut self,
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
        falsify_from: Option<usize>,
    ) -> Result<VerdictOutcome> {
        let caller = self.dealer(challenger)?.identity();
        let round = self.next_round();
        let outcome = self.ceremony.raise_complaint(
            caller,
            Complaint::MissingData {
                challenger,
                accused,
            },
            round,
        )?;
        if !matches!(outcome, ComplaintOutcome::DisputeOpened { .. }) {
            bail!("Complaint did not open a dispute: {outcome:?}");
        }

        let posted = self
            .ceremony
            .commitment(accused)
            .context("Accused has no commitment")?;
        let truth = prefix_evaluations(&self.backend, &posted.g1, challenger as u64)
            .context("Accused commitment is not in G1")?;
        let revealed = self.dealer(accused)?.prefix_aggregates(&self.backend, challenger)?;
        let accused_id = self.dealer(accused)?.identity();

        loop {
            let session = self.ceremony.dispute().context("Dispute vanished")?;
            if session.turn() == DisputeTurn::Resolved {
                break;
            }
            let mid = session.mid();
            let claim = match falsify_from {
                Some(from) if mid >= from => self.backend.g1_generator(),
                _ => revealed
                    .get(mid)
                    .cloned()
                    .context("Aggregate index out of range")?,
            };
            let agree = truth
                .get(mid)
                .map(|expected| self.backend.g1_equal(&claim, expected))
                .unwrap_or(false);

            let round = self.next_round();
            self.ceremony
                .dispute_accused_turn(accused_id, claim, round)?;
            let round = self.next_round();
            self.ceremony
                .dispute_challenger_turn(caller, agree, round)?;
            info!(mid, agree, "Dispute round played");
        }

        let encrypted_share = *self
            .ceremony
            .commitment(accused)
            .and_then(|c| c.share_for(challenger))
            .context("No share for the challenger")?;
        let closure = DisputeClosure {
            encrypted_share,
            signature: self
                .dealer(accused)?
                .sign_share(accused, challenger, &encrypted_share)?,
            decryption_key: self.dealer(challenger)?.decryption_key().clone(),
        };
        let round = self.next_round();
        Ok(self.ceremony.close_dispute(caller, closure, round)?)
    }

    pub fn summary(&self, scenario: &str) -> Summary {
        let ledger = self.ceremony.ledger();
        let participants = self
            .ceremony
            .participants()
            .map(|p| ParticipantSummary {
                index: p.index,
                identity: p.identity.to_string(),
                slashed: p.is_slashed,
                refunded: ledger
                    .payouts()
                    .iter()
                    .filter(|x| x.recipient == p.index && x.reason == PayoutReason::Refund)
                    .map(|x| x.amount)
                    .sum(),
                rewarded: ledger
                    .payouts()
                    .iter()
                    .filter(|x| x.recipient == p.index && x.reason == PayoutReason::Reward)
                    .map(|x| x.amount)
                    .sum(),
            })
            .collect();

        Summary {
            scenario: scenario.to_string(),
            phase: self.ceremony.phase(),
            rounds: self.round,
            version: self.ceremony.version(),
            group_public_key: self
                .ceremony
                .group_public_key()
                .map(|k| hex::encode(k.as_bytes())),
            complaints: self.ceremony.complaints().len(),
            collected: ledger.collected(),
            paid_out: ledger.paid_out(),
            participants,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParticipantSummary {
    pub index: ParticipantIndex,
    pub identity: String,
    pub slashed: bool,
    pub refunded: Amount,
    pub rewarded: Amount,
}

/// What a scenario ended with
#[derive(Debug, Serialize)]
pub struct Summary {
    pub scenario: String,
    pub phase: Phase,
    pub rounds: Round,
    pub version: u64,
    pub group_public_key: Option<String>,
    pub complaints: usize,
    pub collected: Amount,
    pub paid_out: Amount,
    pub participants: Vec<ParticipantSummary>,
}
