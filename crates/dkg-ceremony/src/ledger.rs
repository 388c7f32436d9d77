//! Deposit accounting
//!
//! Deposits are escrowed at enrollment and leave the ledger only as payouts.
//! `collected == paid_out + held` holds after every operation, and every
//! terminal path of the ceremony drains `held` to zero.

use crate::types::{Amount, ComplaintId, ParticipantIndex};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Why a payout was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutReason {
    /// A participant's own deposit returned
    Refund,
    /// A share of forfeited deposits
    Reward,
}

/// A single transfer out of escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub recipient: ParticipantIndex,
    pub amount: Amount,
    pub reason: PayoutReason,
}

/// Outcome of one settlement: who lost their deposit and what was paid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub slashed: Vec<ParticipantIndex>,
    pub payouts: Vec<Payout>,
}

/// Escrow of participant deposits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlashingLedger {
    collected: Amount,
    paid_out: Amount,
    held: BTreeMap<ParticipantIndex, Amount>,
    slashed: BTreeSet<ParticipantIndex>,
    settled: BTreeSet<ComplaintId>,
    payouts: Vec<Payout>,
}

impl SlashingLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a deposit into escrow
    pub fn escrow(&mut self, index: ParticipantIndex, amount: Amount) -> Result<()> {
        if self.held.contains_key(&index) {
            return Err(Error::Internal(format!(
                "Deposit of participant {index} is already held"
            )));
        }
        self.collected += amount;
        self.held.insert(index, amount);
        Ok(())
    }

    /// Forfeit the deposit of `guilty` and split it over everyone still held
    ///
    /// Every other held deposit is refunded at the same time. A complaint
    /// can be settled only once.
    pub fn apply_verdict(
        &mut self,
        complaint_id: ComplaintId,
        guilty: ParticipantIndex,
    ) -> Result<Settlement> {
        self.ensure_unsettled(complaint_id)?;
        if self.slashed.contains(&guilty) {
            return Err(Error::AlreadySlashed(format!("participant {guilty}")));
        }
        if !self.held.contains_key(&guilty) {
            return Err(Error::UnknownParticipant(guilty));
        }

        let settlement = self.distribute(&[guilty])?;
        self.settled.insert(complaint_id);
        info!(complaint_id, guilty, "Verdict settled");
        Ok(settlement)
    }

    /// Settle a missing-data complaint raised after the commit window
    ///
    /// Every participant that never committed forfeits, not only the one
    /// named in the complaint.
    pub fn apply_missing_data_verdict(
        &mut self,
        complaint_id: ComplaintId,
        committed: &[ParticipantIndex],
    ) -> Result<Settlement> {
        self.ensure_unsettled(complaint_id)?;
        let settlement = self.forfeit_missing(committed)?;
        self.settled.insert(complaint_id);
        info!(complaint_id, slashed = ?settlement.slashed, "Missing-data verdict settled");
        Ok(settlement)
    }

    fn ensure_unsettled(&self, complaint_id: ComplaintId) -> Result<()> {
        if self.settled.contains(&complaint_id) {
            return Err(Error::AlreadySlashed(format!("complaint {complaint_id}")));
        }
        Ok(())
    }

    /// Return every held deposit in full
    pub fn refund_all(&mut self) -> Settlement {
        let held = std::mem::take(&mut self.held);
        let payouts: Vec<Payout> = held
            .into_iter()
            .map(|(recipient, amount)| Payout {
                recipient,
                amount,
                reason: PayoutReason::Refund,
            })
            .collect();
        self.record(&payouts);
        debug!(count = payouts.len(), "Deposits refunded");
        Settlement {
            slashed: Vec::new(),
            payouts,
        }
    }

    /// Forfeit the deposits of everyone not in `committed`, split among
    /// those who are
    ///
    /// If nobody committed there is nobody to reward and everyone is
    /// refunded instead.
    pub fn forfeit_missing(&mut self, committed: &[ParticipantIndex]) -> Result<Settlement> {
        let missing: Vec<ParticipantIndex> = self
            .held
            .keys()
            .copied()
            .filter(|index| !committed.contains(index))
            .collect();

        if missing.is_empty() || missing.len() == self.held.len() {
            return Ok(self.refund_all());
        }
        self.distribute(&missing)
    }

    fn distribute(&mut self, forfeiting: &[ParticipantIndex]) -> Result<Settlement> {
        let recipients: Vec<ParticipantIndex> = self
            .held
            .keys()
            .copied()
            .filter(|index| !forfeiting.contains(index))
            .collect();
        if recipients.is_empty() {
            return Err(Error::Internal(
                "No participant left to receive forfeited deposits".into(),
            ));
        }

        let mut forfeited: Amount = 0;
        for index in forfeiting {
            forfeited += self.held.remove(index).unwrap_or_default();
            self.slashed.insert(*index);
        }

        let count = recipients.len() as Amount;
        let share = forfeited / count;
        let remainder = forfeited % count;

        let mut payouts = Vec::with_capacity(recipients.len() * 2);
        for (position, recipient) in recipients.into_iter().enumerate() {
            if let Some(amount) = self.held.remove(&recipient) {
                payouts.push(Payout {
                    recipient,
                    amount,
                    reason: PayoutReason::Refund,
                });
            }
            let reward = share + Amount::from((position as Amount) < remainder);
            if reward > 0 {
                payouts.push(Payout {
                    recipient,
                    amount: reward,
                    reason: PayoutReason::Reward,
                });
            }
        }

        self.record(&payouts);
        debug!(?forfeiting, forfeited, "Forfeited deposits redistributed");
        Ok(Settlement {
            slashed: forfeiting.to_vec(),
            payouts,
        })
    }

    fn record(&mut self, payouts: &[Payout]) {
        for payout in payouts {
            self.paid_out += payout.amount;
        }
        self.payouts.extend_from_slice(payouts);
    }

    /// Total escrowed since the start
    pub fn collected(&self) -> Amount {
        self.collected
    }

    /// Total paid out since the start
    pub fn paid_out(&self) -> Amount {
        self.paid_out
    }

    /// Value still in escrow
    pub fn balance(&self) -> Amount {
        self.held.values().sum()
    }

    /// Deposit still held for a participant
    pub fn held(&self, index: ParticipantIndex) -> Option<Amount> {
        self.held.get(&index).copied()
    }

    /// Participants whose deposits were forfeited
    pub fn slashed(&self) -> impl Iterator<Item = ParticipantIndex> + '_ {
        self.slashed.iter().copied()
    }

    /// Whether a complaint has already been settled
    pub fn is_settled(&self, complaint_id: ComplaintId) -> bool {
        self.settled.contains(&complaint_id)
    }

    /// Every payout made, in order
    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// Sum of everything paid to one participant
    pub fn paid_to(&self, index: ParticipantIndex) -> Amount {
        self.payouts
            .iter()
            .filter(|p| p.recipient == index)
            .map(|p| p.amount)
            .sum()
    }
}
