//! Participant registry
//!
//! Participants are kept for the whole life of the ceremony, including after
//! they were refunded or slashed, so the record can be audited.

use crate::types::{Address, Amount, Digest, G1Point, ParticipantIndex, Round};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An enrolled participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// 1-based index, assigned in join order
    pub index: ParticipantIndex,
    /// Identity that enrolled
    pub identity: Address,
    /// G1 key shares are encrypted to
    pub encryption_key: G1Point,
    /// keccak-256 of the polynomial commitments to be posted
    #[serde(with = "crate::types::hex_serde")]
    pub commitment_digest: Digest,
    /// Escrowed deposit
    pub deposit: Amount,
    /// Posted its commitment
    pub has_committed: bool,
    /// Lost its deposit
    pub is_slashed: bool,
    /// Got its deposit back
    pub refunded: bool,
    /// Round of enrollment
    pub enrolled_at: Round,
}

impl Participant {
    /// Neither slashed nor refunded
    pub fn is_active(&self) -> bool {
        !self.is_slashed && !self.refunded
    }
}

/// Registry of enrolled participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRegistry {
    capacity: usize,
    deposit: Amount,
    participants: Vec<Participant>,
}

impl ParticipantRegistry {
    /// Create an empty registry for `capacity` participants
    pub fn new(capacity: usize, deposit: Amount) -> Self {
        Self {
            capacity,
            deposit,
            participants: Vec::with_capacity(capacity),
        }
    }

    /// Enroll a new participant and return its index
    pub fn enroll(
        &mut self,
        identity: Address,
        encryption_key: G1Point,
        commitment_digest: Digest,
        deposit_paid: Amount,
        round: Round,
    ) -> Result<ParticipantIndex> {
        if deposit_paid != self.deposit {
            return Err(Error::IncorrectDeposit {
                required: self.deposit,
                actual: deposit_paid,
            });
        }
        if self.is_full() {
            return Err(Error::RegistryFull(self.capacity));
        }
        if self.index_of(&identity).is_some() {
            return Err(Error::DuplicateEnrollment(identity.to_string()));
        }

        let index = self.participants.len() + 1;
        self.participants.push(Participant {
            index,
            identity,
            encryption_key,
            commitment_digest,
            deposit: deposit_paid,
            has_committed: false,
            is_slashed: false,
            refunded: false,
            enrolled_at: round,
        });

        debug!(index, identity = %identity, "Participant enrolled");
        Ok(index)
    }

    /// Look up a participant
    pub fn get(&self, index: ParticipantIndex) -> Result<&Participant> {
        index
            .checked_sub(1)
            .and_then(|i| self.participants.get(i))
            .ok_or(Error::UnknownParticipant(index))
    }

    fn get_mut(&mut self, index: ParticipantIndex) -> Result<&mut Participant> {
        index
            .checked_sub(1)
            .and_then(|i| self.participants.get_mut(i))
            .ok_or(Error::UnknownParticipant(index))
    }

    /// Index held by an identity
    pub fn index_of(&self, identity: &Address) -> Option<ParticipantIndex> {
        self.participants
            .iter()
            .find(|p| p.identity == *identity)
            .map(|p| p.index)
    }

    /// Fail unless `caller` is the identity behind `index`
    pub fn require_identity(&self, index: ParticipantIndex, caller: &Address) -> Result<&Participant> {
        let participant = self.get(index)?;
        if participant.identity != *caller {
            return Err(Error::Unauthorized(index));
        }
        Ok(participant)
    }

    /// Record that a participant posted its commitment
    pub fn mark_committed(&mut self, index: ParticipantIndex) -> Result<()> {
        self.get_mut(index)?.has_committed = true;
        Ok(())
    }

    /// Record that a participant lost its deposit
    pub fn mark_slashed(&mut self, index: ParticipantIndex) -> Result<()> {
        let participant = self.get_mut(index)?;
        if participant.is_slashed {
            return Err(Error::AlreadySlashed(format!("participant {index}")));
        }
        participant.is_slashed = true;
        Ok(())
    }

    /// Record that a participant got its deposit back
    pub fn mark_refunded(&mut self, index: ParticipantIndex) -> Result<()> {
        self.get_mut(index)?.refunded = true;
        Ok(())
    }

    /// Number of enrolled participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// No participant enrolled yet
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// All slots taken
    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity
    }

    /// Every participant posted its commitment
    pub fn all_committed(&self) -> bool {
        self.is_full() && self.participants.iter().all(|p| p.has_committed)
    }

    /// Indices of participants that posted their commitment
    pub fn committed(&self) -> Vec<ParticipantIndex> {
        self.participants
            .iter()
            .filter(|p| p.has_committed)
            .map(|p| p.index)
            .collect()
    }

    /// Iterate over all participants in index order
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Capacity `n`
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn key() -> G1Point {
        G1Point(vec![0xaa; 48])
    }

    #[test]
    fn test_sequential_indices() {
        let mut registry = ParticipantRegistry::new(3, 100);
        for i in 1..=3u8 {
            let index = registry.enroll(address(i), key(), [i; 32], 100, 0).unwrap();
            assert_eq!(index, i as usize);
        }
        assert!(registry.is_full());
        let indices: Vec<_> = registry.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_rejections_leave_indices_contiguous() {
        let mut registry = ParticipantRegistry::new(2, 100);
        assert_eq!(
            registry.enroll(address(1), key(), [0; 32], 99, 0),
            Err(Error::IncorrectDeposit {
                required: 100,
                actual: 99
            })
        );
        assert_eq!(registry.enroll(address(1), key(), [0; 32], 100, 0), Ok(1));
        assert!(matches!(
            registry.enroll(address(1), key(), [0; 32], 100, 0),
            Err(Error::DuplicateEnrollment(_))
        ));
        assert_eq!(registry.enroll(address(2), key(), [0; 32], 100, 0), Ok(2));
        assert_eq!(
            registry.enroll(address(3), key(), [0; 32], 100, 0),
            Err(Error::RegistryFull(2))
        );
    }

    #[test]
    fn test_lookup_and_authorization() {
        let mut registry = ParticipantRegistry::new(2, 100);
        registry.enroll(address(1), key(), [0; 32], 100, 0).unwrap();

        assert_eq!(registry.get(0), Err(Error::UnknownParticipant(0)));
        assert_eq!(registry.get(2), Err(Error::UnknownParticipant(2)));
        assert_eq!(registry.index_of(&address(1)), Some(1));
        assert!(registry.require_identity(1, &address(1)).is_ok());
        assert_eq!(
            registry.require_identity(1, &address(9)).map(|p| p.index),
            Err(Error::Unauthorized(1))
        );
    }

    #[test]
    fn test_status_flags() {
        let mut registry = ParticipantRegistry::new(2, 100);
        registry.enroll(address(1), key(), [0; 32], 100, 0).unwrap();
        registry.enroll(address(2), key(), [0; 32], 100, 0).unwrap();

        registry.mark_committed(1).unwrap();
        assert_eq!(registry.committed(), vec![1]);
        assert!(!registry.all_committed());
        registry.mark_committed(2).unwrap();
        assert!(registry.all_committed());

        registry.mark_slashed(2).unwrap();
        assert!(matches!(registry.mark_slashed(2), Err(Error::AlreadySlashed(_))));
        assert!(!registry.get(2).unwrap().is_active());
        assert!(registry.get(1).unwrap().is_active());
    }
}
