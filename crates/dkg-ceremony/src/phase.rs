//! Ceremony phases and the transition table

use crate::types::{Round, Timeouts};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Phase of a ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Participants join and escrow deposits
    Enrollment,
    /// Participants post commitments and encrypted shares
    PostEnrollment,
    /// Everything is posted; complaints may be raised
    AllDataReceived,
    /// The complaint window closed without complaints
    AllDataValid,
    /// Group key posted, waiting for the finalization deadline
    PostGroupPk,
    /// An interactive dispute is running
    Complaint,
    /// Ceremony produced a group key
    EndSuccess,
    /// Ceremony aborted
    EndFail,
}

impl Phase {
    /// No command is accepted any more
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::EndSuccess | Phase::EndFail)
    }
}

/// Something that moves the ceremony between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    EnrollmentQuotaReached,
    EnrollmentTimeout,
    CommitQuotaReached,
    CommitTimeout,
    /// A complaint opened an interactive dispute
    ComplaintRaised,
    /// A single-shot complaint was decided
    VerdictApplied,
    ComplaintWindowClosed,
    DisputeResolved,
    GroupKeySubmitted,
    FinalizeTimeout,
}

impl Event {
    /// Fires only after the current phase's deadline
    pub fn is_timeout(self) -> bool {
        matches!(
            self,
            Event::EnrollmentTimeout
                | Event::CommitTimeout
                | Event::ComplaintWindowClosed
                | Event::FinalizeTimeout
        )
    }
}

/// A completed transition, kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub event: Event,
    pub round: Round,
}

/// Fixed `(phase, event)` transition table
pub fn next(phase: Phase, event: Event) -> Option<Phase> {
    use Event::*;
    use Phase::*;

    match (phase, event) {
        (Enrollment, EnrollmentQuotaReached) => Some(PostEnrollment),
        (Enrollment, EnrollmentTimeout) => Some(EndFail),
        (PostEnrollment, CommitQuotaReached) => Some(AllDataReceived),
        (PostEnrollment, CommitTimeout) => Some(EndFail),
        (PostEnrollment, VerdictApplied) => Some(EndFail),
        (AllDataReceived, ComplaintRaised) => Some(Complaint),
        (AllDataReceived, VerdictApplied) => Some(EndFail),
        (AllDataReceived, ComplaintWindowClosed) => Some(AllDataValid),
        (Complaint, DisputeResolved) => Some(EndFail),
        (AllDataValid, GroupKeySubmitted) => Some(PostGroupPk),
        (AllDataValid, FinalizeTimeout) => Some(EndFail),
        (PostGroupPk, FinalizeTimeout) => Some(EndSuccess),
        _ => None,
    }
}

/// Phase state machine with deadlines against the external round counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseController {
    phase: Phase,
    started_at: Round,
    timeouts: Timeouts,
    history: Vec<Transition>,
}

impl PhaseController {
    /// Start in `Enrollment` at `round`
    pub fn new(timeouts: Timeouts, round: Round) -> Self {
        Self {
            phase: Phase::Enrollment,
            started_at: round,
            timeouts,
            history: Vec::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Round the current phase began
    pub fn started_at(&self) -> Round {
        self.started_at
    }

    /// Transitions taken so far
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Fail with `PhaseViolation` unless the ceremony is in `phase`
    pub fn ensure(&self, action: &'static str, phase: Phase) -> Result<()> {
        self.ensure_any(action, &[phase])
    }

    /// Fail with `PhaseViolation` unless the ceremony is in one of `phases`
    pub fn ensure_any(&self, action: &'static str, phases: &[Phase]) -> Result<()> {
        if phases.contains(&self.phase) {
            Ok(())
        } else {
            Err(Error::PhaseViolation {
                action,
                phase: self.phase,
            })
        }
    }

    /// Last round at which the current phase's timeout cannot yet fire
    pub fn deadline(&self) -> Option<Round> {
        let timeout = match self.phase {
            Phase::Enrollment => self.timeouts.enrollment,
            Phase::PostEnrollment => self.timeouts.commit,
            Phase::AllDataReceived => self.timeouts.complaint_window,
            Phase::AllDataValid | Phase::PostGroupPk => self.timeouts.finalization,
            Phase::Complaint | Phase::EndSuccess | Phase::EndFail => return None,
        };
        Some(self.started_at.saturating_add(timeout))
    }

    /// Fail with `QuotaNotMet` until `round` is past the current deadline
    pub fn ensure_expired(&self, round: Round) -> Result<()> {
        match self.deadline() {
            Some(deadline) if round > deadline => Ok(()),
            Some(deadline) => Err(Error::QuotaNotMet { deadline, round }),
            None => Err(Error::Internal(format!(
                "Phase {:?} has no deadline",
                self.phase
            ))),
        }
    }

    /// Apply `event` at `round`
    pub fn advance(&mut self, event: Event, round: Round) -> Result<Phase> {
        let to = next(self.phase, event).ok_or(Error::PhaseViolation {
            action: event_name(event),
            phase: self.phase,
        })?;
        if event.is_timeout() {
            self.ensure_expired(round)?;
        }

        let from = self.phase;
        self.history.push(Transition {
            from,
            to,
            event,
            round,
        });
        self.phase = to;
        self.started_at = round;
        info!(?from, ?to, ?event, round, "Phase transition");
        Ok(to)
    }
}

fn event_name(event: Event) -> &'static str {
    match event {
        Event::EnrollmentQuotaReached => "enrollment quota",
        Event::EnrollmentTimeout => "enrollment timeout",
        Event::CommitQuotaReached => "commit quota",
        Event::CommitTimeout => "commit timeout",
        Event::ComplaintRaised => "complaint",
        Event::VerdictApplied => "verdict",
        Event::ComplaintWindowClosed => "complaint window timeout",
        Event::DisputeResolved => "dispute resolution",
        Event::GroupKeySubmitted => "group key submission",
        Event::FinalizeTimeout => "finalization timeout",
    }
}
