//! Commitment store
//!
//! Holds every participant's polynomial commitments (each coefficient in
//! both G1 and G2) and the shares it encrypted for each recipient. Points are
//! accepted as posted: a commitment containing bytes that are not group
//! elements is stored anyway and becomes provable misbehavior.

use crate::curve::CurveBackend;
use crate::signature::keccak256;
use crate::types::{Digest, EncryptedShare, G1Point, G2Point, ParticipantIndex, Round};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Group a committed point lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Group {
    G1,
    G2,
}

/// One participant's posted data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// Coefficient commitments in G1, constant term first
    pub g1: Vec<G1Point>,
    /// The same coefficients committed in G2
    pub g2: Vec<G2Point>,
    /// Share for recipient `j` at position `j - 1`
    pub shares: Vec<EncryptedShare>,
    /// Round the commitment was accepted
    pub submitted_at: Round,
}

impl Commitment {
    /// Digest a participant posts at enrollment, binding its coefficient
    /// commitments before anyone else's are visible
    pub fn digest(g1: &[G1Point], g2: &[G2Point]) -> Digest {
        let mut data = Vec::new();
        data.extend_from_slice(&(g1.len() as u64).to_be_bytes());
        for point in g1 {
            data.extend_from_slice(&(point.0.len() as u64).to_be_bytes());
            data.extend_from_slice(point.as_bytes());
        }
        data.extend_from_slice(&(g2.len() as u64).to_be_bytes());
        for point in g2 {
            data.extend_from_slice(&(point.0.len() as u64).to_be_bytes());
            data.extend_from_slice(point.as_bytes());
        }
        keccak256(&data)
    }

    /// Share addressed to `recipient`
    pub fn share_for(&self, recipient: ParticipantIndex) -> Option<&EncryptedShare> {
        recipient.checked_sub(1).and_then(|i| self.shares.get(i))
    }
}

/// Store of posted commitments and the final group key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentStore {
    n: usize,
    t: usize,
    commitments: BTreeMap<ParticipantIndex, Commitment>,
    group_public_key: Option<G2Point>,
}

impl CommitmentStore {
    /// Create an empty store for `n` participants and degree `t`
    pub fn new(n: usize, t: usize) -> Self {
        Self {
            n,
            t,
            commitments: BTreeMap::new(),
            group_public_key: None,
        }
    }

    /// Accept a participant's commitment
    ///
    /// Checks shape and the enrollment digest only.
    pub fn submit(
        &mut self,
        index: ParticipantIndex,
        g1: Vec<G1Point>,
        g2: Vec<G2Point>,
        shares: Vec<EncryptedShare>,
        expected_digest: &Digest,
        round: Round,
    ) -> Result<()> {
        if self.commitments.contains_key(&index) {
            return Err(Error::DuplicateSubmission(index));
        }
        if g1.len() != self.t + 1 || g2.len() != self.t + 1 {
            return Err(Error::MalformedSubmission(format!(
                "Expected {} coefficient commitments per group, got {} in G1 and {} in G2",
                self.t + 1,
                g1.len(),
                g2.len()
            )));
        }
        if shares.len() != self.n {
            return Err(Error::MalformedSubmission(format!(
                "Expected {} encrypted shares, got {}",
                self.n,
                shares.len()
            )));
        }
        if Commitment::digest(&g1, &g2) != *expected_digest {
            return Err(Error::InvalidProof(format!(
                "Commitment of participant {index} does not match its enrollment digest"
            )));
        }

        self.commitments.insert(
            index,
            Commitment {
                g1,
                g2,
                shares,
                submitted_at: round,
            },
        );
        debug!(index, "Commitment stored");
        Ok(())
    }

    /// Posted commitment of a participant
    pub fn get(&self, index: ParticipantIndex) -> Option<&Commitment> {
        self.commitments.get(&index)
    }

    /// Number of posted commitments
    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    /// No commitment posted yet
    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    /// Sum of every participant's G2 constant-term commitment
    ///
    /// `None` if a commitment is missing or a point is not in G2.
    pub fn aggregate_group_key<B: CurveBackend + ?Sized>(&self, backend: &B) -> Option<G2Point> {
        if self.commitments.len() != self.n {
            return None;
        }
        let mut constants = self.commitments.values().map(|c| c.g2.first());
        let mut sum = constants.next()??.clone();
        if !backend.g2_is_member(&sum) {
            return None;
        }
        for constant in constants {
            sum = backend.g2_add(&sum, constant?)?;
        }
        Some(sum)
    }

    /// Fix the group public key; it can never change afterwards
    pub fn set_group_public_key<B: CurveBackend + ?Sized>(
        &mut self,
        backend: &B,
        point: G2Point,
    ) -> Result<()> {
        if self.group_public_key.is_some() {
            return Err(Error::GroupKeyAlreadySet);
        }
        let expected = self.aggregate_group_key(backend).ok_or_else(|| {
            Error::InvalidProof("Group key cannot be derived from the posted commitments".into())
        })?;
        if point != expected {
            return Err(Error::InvalidProof(
                "Group key differs from the sum of constant-term commitments".into(),
            ));
        }
        self.group_public_key = Some(point);
        Ok(())
    }

    /// The finalized group public key
    pub fn group_public_key(&self) -> Option<&G2Point> {
        self.group_public_key.as_ref()
    }
}
