use std::time::{Instant, SystemTime};

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{SessionEntity, SessionStatus, SessionUpdate};

/// Phases a live session goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Players are joining.
    Lobby,
    /// A question is open for answers.
    Running {
        /// Question currently asked.
        question_id: Uuid,
    },
    /// Interim leaderboard after a question closed.
    ScoreDisplay {
        /// Question that was just closed.
        question_id: Uuid,
    },
    /// Terminal phase with the final standings.
    Finished,
}

impl SessionPhase {
    /// Rebuild the phase from a persisted `(status, current_question_id)` pair.
    ///
    /// Returns `None` when the record claims an active question without naming it.
    pub fn from_record(record: &SessionEntity) -> Option<Self> {
        match (record.status, record.current_question_id) {
            (SessionStatus::Lobby, _) => Some(Self::Lobby),
            (SessionStatus::Running, Some(question_id)) => Some(Self::Running { question_id }),
            (SessionStatus::ScoreDisplay, Some(question_id)) => {
                Some(Self::ScoreDisplay { question_id })
            }
            (SessionStatus::Finished, _) => Some(Self::Finished),
            (SessionStatus::Running | SessionStatus::ScoreDisplay, None) => None,
        }
    }

    /// Persisted status for this phase.
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Lobby => SessionStatus::Lobby,
            Self::Running { .. } => SessionStatus::Running,
            Self::ScoreDisplay { .. } => SessionStatus::ScoreDisplay,
            Self::Finished => SessionStatus::Finished,
        }
    }

    /// Question attached to the phase, if any.
    pub fn question_id(&self) -> Option<Uuid> {
        match self {
            Self::Running { question_id } | Self::ScoreDisplay { question_id } => {
                Some(*question_id)
            }
            Self::Lobby | Self::Finished => None,
        }
    }

    /// Record update that persists entering this phase.
    ///
    /// Entering `Running` stamps `now` as the question start; other phases keep
    /// the previous start time so reports can still reference it.
    pub fn update(&self, previous_started_at: Option<SystemTime>, now: SystemTime) -> SessionUpdate {
        let question_started_at = match self {
            Self::Running { .. } => Some(now),
            _ => previous_started_at,
        };
        SessionUpdate {
            status: self.status(),
            current_question_id: self.question_id(),
            question_started_at,
        }
    }
}

/// Why a running question is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The countdown elapsed.
    Timeout,
    /// The host skipped ahead.
    HostAdvance,
}

/// Events that can be applied to the state machine.
///
/// Events that move to another question carry the target resolved from the
/// game's question order, `None` meaning there is nothing left to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the session from the lobby.
    HostStart {
        /// First question by order, if the game has any.
        first: Option<Uuid>,
    },
    /// Close the running question.
    CloseQuestion {
        /// Question the caller expects to be running.
        question_id: Uuid,
        /// What triggered the close.
        reason: CloseReason,
    },
    /// Leave the score display.
    Advance {
        /// Next question by order, if any.
        next: Option<Uuid>,
    },
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: u64,
        /// Current version.
        actual: u64,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: SessionPhase,
    /// Phase the state machine will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: u64,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number, mirrored from the session record.
    pub version: u64,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<SessionPhase>,
}

/// Per-session state machine for the lobby, question, score and end flow.
///
/// The machine is a cache of the persisted record: callers [`sync`](Self::sync)
/// it from a fresh read before planning so that a transition computed by a
/// stale actor is rejected instead of replayed.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: u64,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Lobby,
            version: 0,
            pending: None,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Overwrite phase and version with the authoritative values.
    ///
    /// Refused while a plan is pending so an in-flight transition keeps the
    /// baseline it was validated against.
    pub fn sync(&mut self, phase: SessionPhase, version: u64) -> Result<(), PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        self.phase = phase;
        self.version = version;
        Ok(())
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Lobby, SessionEvent::HostStart { first: Some(question_id) }) => {
                SessionPhase::Running { question_id }
            }
            (SessionPhase::Lobby, SessionEvent::HostStart { first: None }) => {
                SessionPhase::Finished
            }
            (
                SessionPhase::Running { question_id },
                SessionEvent::CloseQuestion {
                    question_id: expected,
                    ..
                },
            ) if question_id == expected => SessionPhase::ScoreDisplay { question_id },
            (SessionPhase::ScoreDisplay { .. }, SessionEvent::Advance { next: Some(question_id) }) => {
                SessionPhase::Running { question_id }
            }
            (SessionPhase::ScoreDisplay { .. }, SessionEvent::Advance { next: None }) => {
                SessionPhase::Finished
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
