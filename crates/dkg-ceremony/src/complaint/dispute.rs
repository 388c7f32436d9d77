//! Interactive binary-search dispute
//!
//! The challenger `j` claims the accused's data for it is inconsistent. The
//! accused posts prefix aggregates `A_k = Σ_{i≤k} C_i · j^i` of its committed
//! polynomial and the challenger agrees or disagrees with each one. Starting
//! from `low = -1, high = t`, each round halves the candidate range, so the
//! session converges to `high - low == 1` after at most `⌈log2(t+1)⌉` rounds.
//! At that point `A_low` is agreed and `A_high` is contested, and a single
//! group operation tells who lied.

use super::{check_decryption_key, Verdict};
use crate::commitments::CommitmentStore;
use crate::curve::{commitment_term, g1_base_mul, CurveBackend};
use crate::encryption::decrypt_share;
use crate::registry::ParticipantRegistry;
use crate::signature::SignatureVerifier;
use crate::types::{
    ComplaintId, EncryptedShare, G1Point, ParticipantIndex, Round, Scalar, Signature,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const SHARE_DOMAIN: &[u8] = b"dkg-share";

/// Message a dealer signs to vouch for the share it sent a recipient
pub fn share_message(
    dealer: ParticipantIndex,
    recipient: ParticipantIndex,
    share: &EncryptedShare,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(SHARE_DOMAIN.len() + 16 + 32);
    message.extend_from_slice(SHARE_DOMAIN);
    message.extend_from_slice(&(dealer as u64).to_be_bytes());
    message.extend_from_slice(&(recipient as u64).to_be_bytes());
    message.extend_from_slice(&share.0);
    message
}

/// Whose move it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeTurn {
    /// Accused must post the aggregate at `mid`
    AccusedTurn,
    /// Challenger must agree or disagree with it
    ChallengerTurn,
    /// Search converged; the challenger must close the dispute
    Resolved,
}

impl DisputeTurn {
    fn waiting_for(self) -> &'static str {
        match self {
            DisputeTurn::AccusedTurn => "accused",
            DisputeTurn::ChallengerTurn => "challenger",
            DisputeTurn::Resolved => "closure",
        }
    }
}

/// State of one dispute, persisted between calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeSession {
    pub complaint_id: ComplaintId,
    pub challenger: ParticipantIndex,
    pub accused: ParticipantIndex,
    low: i64,
    high: i64,
    turn: DisputeTurn,
    round_count: u32,
    claims: BTreeMap<usize, G1Point>,
    turn_started_at: Round,
}

impl DisputeSession {
    /// Open a session over the `t + 1` coefficients of a degree-`t` polynomial
    pub fn open(
        complaint_id: ComplaintId,
        challenger: ParticipantIndex,
        accused: ParticipantIndex,
        t: usize,
        round: Round,
    ) -> Self {
        let mut session = Self {
            complaint_id,
            challenger,
            accused,
            low: -1,
            high: t as i64,
            turn: DisputeTurn::AccusedTurn,
            round_count: 0,
            claims: BTreeMap::new(),
            turn_started_at: round,
        };
        if session.converged() {
            session.turn = DisputeTurn::Resolved;
        }
        session
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    pub fn turn(&self) -> DisputeTurn {
        self.turn
    }

    /// Completed agree/disagree rounds
    pub fn round_count(&self) -> u32 {
        self.round_count
    }

    /// Aggregates the accused has posted, by coefficient index
    pub fn claims(&self) -> &BTreeMap<usize, G1Point> {
        &self.claims
    }

    /// Index under examination this round
    pub fn mid(&self) -> usize {
        (self.low + (self.high - self.low + 1) / 2) as usize
    }

    fn converged(&self) -> bool {
        self.high - self.low == 1
    }

    fn expect(&self, turn: DisputeTurn) -> Result<()> {
        if self.turn != turn {
            return Err(Error::OutOfTurn {
                expected: self.turn.waiting_for(),
            });
        }
        Ok(())
    }

    /// Accused posts its aggregate at `mid`
    pub fn accused_turn(&mut self, value: G1Point, round: Round) -> Result<()> {
        self.expect(DisputeTurn::AccusedTurn)?;
        let mid = self.mid();
        self.claims.insert(mid, value);
        self.turn = DisputeTurn::ChallengerTurn;
        self.turn_started_at = round;
        debug!(complaint_id = self.complaint_id, mid, "Accused posted aggregate");
        Ok(())
    }

    /// Challenger agrees or disagrees with the aggregate at `mid`
    pub fn challenger_turn(&mut self, agree: bool, round: Round) -> Result<()> {
        self.expect(DisputeTurn::ChallengerTurn)?;
        let mid = self.mid() as i64;
        if agree {
            self.low = mid;
        } else {
            self.high = mid;
        }
        self.round_count += 1;
        self.turn = if self.converged() {
            DisputeTurn::Resolved
        } else {
            DisputeTurn::AccusedTurn
        };
        self.turn_started_at = round;
        debug!(
            complaint_id = self.complaint_id,
            agree,
            low = self.low,
            high = self.high,
            "Challenger answered"
        );
        Ok(())
    }

    /// Last round at which the party on turn may still act
    pub fn deadline(&self, turn_timeout: Round) -> Round {
        self.turn_started_at.saturating_add(turn_timeout)
    }

    /// Party that loses if the current turn times out
    pub fn silent_party(&self) -> ParticipantIndex {
        match self.turn {
            DisputeTurn::AccusedTurn => self.accused,
            DisputeTurn::ChallengerTurn | DisputeTurn::Resolved => self.challenger,
        }
    }

    /// Verdict if the current turn times out
    pub fn default_verdict(&self) -> Verdict {
        match self.turn {
            DisputeTurn::AccusedTurn => Verdict::AccusedGuilty,
            DisputeTurn::ChallengerTurn | DisputeTurn::Resolved => Verdict::ChallengerGuilty,
        }
    }

    /// Worst-case number of rounds for degree `t`: `⌈log2(t+1)⌉`
    pub fn max_rounds(t: usize) -> u32 {
        (t + 1).next_power_of_two().trailing_zeros()
    }
}

/// Proof the challenger submits once the search has converged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeClosure {
    /// Share the accused sent the challenger
    pub encrypted_share: EncryptedShare,
    /// Accused's signature over [`share_message`] for that share
    pub signature: Signature,
    /// Challenger's decryption key
    pub decryption_key: Scalar,
}

/// Decides converged disputes
pub struct DisputeResolver<'a, B: CurveBackend + ?Sized, V: SignatureVerifier + ?Sized> {
    backend: &'a B,
    verifier: &'a V,
    registry: &'a ParticipantRegistry,
    store: &'a CommitmentStore,
    t: usize,
}

impl<'a, B, V> DisputeResolver<'a, B, V>
where
    B: CurveBackend + ?Sized,
    V: SignatureVerifier + ?Sized,
{
    pub fn new(
        backend: &'a B,
        verifier: &'a V,
        registry: &'a ParticipantRegistry,
        store: &'a CommitmentStore,
        t: usize,
    ) -> Self {
        Self {
            backend,
            verifier,
            registry,
            store,
            t,
        }
    }

    /// Judge a converged session
    pub fn close(&self, session: &DisputeSession, closure: &DisputeClosure) -> Result<Verdict> {
        session.expect(DisputeTurn::Resolved)?;

        let accused = self.registry.get(session.accused)?;
        let challenger = self.registry.get(session.challenger)?;

        let message = share_message(accused.index, challenger.index, &closure.encrypted_share);
        if !self
            .verifier
            .verify(&accused.identity, &message, &closure.signature)
        {
            return Err(Error::SignatureMismatch(accused.index));
        }
        check_decryption_key(self.backend, challenger, &closure.decryption_key)?;

        let commitment = self.store.get(accused.index).ok_or_else(|| {
            Error::InvalidProof(format!("Participant {} has no commitment", accused.index))
        })?;

        let k = session.high as usize;
        let x = challenger.index as u64;
        let Some(term) = commitment
            .g1
            .get(k)
            .and_then(|c| commitment_term(self.backend, c, x, k))
        else {
            return Ok(Verdict::AccusedGuilty);
        };

        // A_low was agreed by both sides, so it is the challenger's to defend
        let expected = if session.low < 0 {
            term
        } else {
            let agreed = session
                .claims
                .get(&(session.low as usize))
                .ok_or_else(|| Error::Internal("Agreed aggregate was never posted".into()))?;
            match self.backend.g1_add(agreed, &term) {
                Some(sum) => sum,
                None => return Ok(Verdict::ChallengerGuilty),
            }
        };

        let claim_consistent = match session.claims.get(&k) {
            Some(claim) => self.backend.g1_equal(claim, &expected),
            None => true,
        };

        let verdict = if k < self.t {
            if claim_consistent {
                Verdict::ChallengerGuilty
            } else {
                Verdict::AccusedGuilty
            }
        } else if claim_consistent
            && self.share_matches(closure, &accused.encryption_key, &expected)
        {
            Verdict::ChallengerGuilty
        } else {
            Verdict::AccusedGuilty
        };

        debug!(
            complaint_id = session.complaint_id,
            coefficient = k,
            ?verdict,
            "Dispute closed"
        );
        Ok(verdict)
    }

    fn share_matches(
        &self,
        closure: &DisputeClosure,
        dealer_key: &G1Point,
        expected: &G1Point,
    ) -> bool {
        let Some(share) = decrypt_share(
            self.backend,
            &closure.encrypted_share,
            &closure.decryption_key,
            dealer_key,
        ) else {
            return false;
        };
        self.backend.scalar_is_canonical(&share)
            && g1_base_mul(self.backend, &share)
                .map(|actual| self.backend.g1_equal(&actual, expected))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(byte: u8) -> G1Point {
        G1Point(vec![byte; 48])
    }

    #[test]
    fn test_zero_degree_starts_resolved() {
        let session = DisputeSession::open(1, 1, 2, 0, 5);
        assert_eq!(session.turn(), DisputeTurn::Resolved);
        assert_eq!(session.high() - session.low(), 1);
        assert_eq!(DisputeSession::max_rounds(0), 0);
    }

    #[test]
    fn test_turns_alternate() {
        let mut session = DisputeSession::open(1, 1, 2, 3, 0);
        assert_eq!(session.mid(), 1);
        assert_eq!(
            session.challenger_turn(true, 1),
            Err(Error::OutOfTurn {
                expected: "accused"
            })
        );
        session.accused_turn(point(1), 1).unwrap();
        assert_eq!(
            session.accused_turn(point(1), 2),
            Err(Error::OutOfTurn {
                expected: "challenger"
            })
        );
        session.challenger_turn(true, 2).unwrap();
        assert_eq!((session.low(), session.high()), (1, 3));
        assert_eq!(session.mid(), 2);
        session.accused_turn(point(2), 3).unwrap();
        session.challenger_turn(false, 4).unwrap();
        assert_eq!((session.low(), session.high()), (1, 2));
        assert_eq!(session.turn(), DisputeTurn::Resolved);
        assert_eq!(session.round_count(), 2);
        assert_eq!(session.claims().len(), 2);
    }

    #[test]
    fn test_rounds_bounded_by_log() {
        for t in 0..=16usize {
            let bound = DisputeSession::max_rounds(t);
            assert_eq!(bound, (t as f64 + 1.0).log2().ceil() as u32);

            // Always disagreeing is the longest path
            let mut session = DisputeSession::open(1, 1, 2, t, 0);
            while session.turn() != DisputeTurn::Resolved {
                let width = session.high() - session.low();
                session.accused_turn(point(0), 0).unwrap();
                session.challenger_turn(false, 0).unwrap();
                assert!(session.high() - session.low() < width);
            }
            assert_eq!(session.round_count(), bound);

            let mut session = DisputeSession::open(1, 1, 2, t, 0);
            while session.turn() != DisputeTurn::Resolved {
                session.accused_turn(point(0), 0).unwrap();
                session.challenger_turn(true, 0).unwrap();
            }
            assert!(session.round_count() <= bound);
            assert_eq!(session.high(), t as i64);
        }
    }

    #[test]
    fn test_silent_party() {
        let mut session = DisputeSession::open(4, 1, 2, 1, 10);
        assert_eq!(session.silent_party(), 2);
        assert_eq!(session.default_verdict(), Verdict::AccusedGuilty);
        assert_eq!(session.deadline(5), 15);
        session.accused_turn(point(3), 12).unwrap();
        assert_eq!(session.silent_party(), 1);
        assert_eq!(session.deadline(5), 17);
        session.challenger_turn(true, 13).unwrap();
        assert_eq!(session.turn(), DisputeTurn::Resolved);
        assert_eq!(session.silent_party(), 1);
        assert_eq!(session.default_verdict(), Verdict::ChallengerGuilty);
    }

    #[test]
    fn test_share_message_binds_parties() {
        let share = EncryptedShare([9u8; 32]);
        assert_ne!(share_message(1, 2, &share), share_message(2, 1, &share));
        assert_eq!(share_message(1, 2, &share).len(), 9 + 16 + 32);
    }
}
