//! Lifecycle events and their dispatch.
//!
//! Events are advisory: delivery is at-least-once and every event can be
//! rebuilt from `get_goal` / `stakes_for`, so consumers reconcile against the
//! ledger instead of trusting the stream.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::types::{Amount, GoalId, Outcome, ParticipantId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    GoalCreated {
        goal_id: GoalId,
        creator: ParticipantId,
        deadline: Timestamp,
        timestamp: Timestamp,
    },

    StakeRecorded {
        goal_id: GoalId,
        participant: ParticipantId,
        amount: Amount,
        pool: Amount,
        timestamp: Timestamp,
    },

    GoalResolved {
        goal_id: GoalId,
        outcome: Outcome,
        pool: Amount,
        dust: Amount,
        timestamp: Timestamp,
    },

    Claimed {
        goal_id: GoalId,
        participant: ParticipantId,
        amount: Amount,
        timestamp: Timestamp,
    },

    /// No further claims; `dust` is permanently unclaimable.
    GoalClosed {
        goal_id: GoalId,
        dust: Amount,
        timestamp: Timestamp,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::GoalCreated { .. } => "goal_created",
            LedgerEvent::StakeRecorded { .. } => "stake_recorded",
            LedgerEvent::GoalResolved { .. } => "goal_resolved",
            LedgerEvent::Claimed { .. } => "claimed",
            LedgerEvent::GoalClosed { .. } => "goal_closed",
        }
    }

    pub fn goal_id(&self) -> GoalId {
        match self {
            LedgerEvent::GoalCreated { goal_id, .. }
            | LedgerEvent::StakeRecorded { goal_id, .. }
            | LedgerEvent::GoalResolved { goal_id, .. }
            | LedgerEvent::Claimed { goal_id, .. }
            | LedgerEvent::GoalClosed { goal_id, .. } => *goal_id,
        }
    }

    /// Participant the event is about, if any.
    pub fn actor(&self) -> Option<&ParticipantId> {
        match self {
            LedgerEvent::GoalCreated { creator, .. } => Some(creator),
            LedgerEvent::StakeRecorded { participant, .. }
            | LedgerEvent::Claimed { participant, .. } => Some(participant),
            LedgerEvent::GoalResolved { .. } | LedgerEvent::GoalClosed { .. } => None,
        }
    }

    /// Value the event moves or reports.
    pub fn amount(&self) -> Option<Amount> {
        match self {
            LedgerEvent::GoalCreated { .. } => None,
            LedgerEvent::StakeRecorded { amount, .. } | LedgerEvent::Claimed { amount, .. } => {
                Some(*amount)
            }
            LedgerEvent::GoalResolved { pool, .. } => Some(*pool),
            LedgerEvent::GoalClosed { dust, .. } => Some(*dust),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            LedgerEvent::GoalCreated { timestamp, .. }
            | LedgerEvent::StakeRecorded { timestamp, .. }
            | LedgerEvent::GoalResolved { timestamp, .. }
            | LedgerEvent::Claimed { timestamp, .. }
            | LedgerEvent::GoalClosed { timestamp, .. } => *timestamp,
        }
    }
}

/// Receives ledger events (UI push, persistence, logs).
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but never undo the ledger change.
    fn send(&self, event: &LedgerEvent) -> Result<(), SinkError>;
}

/// Dispatches events to multiple sinks.
///
/// A failing sink is logged and skipped; the others still receive the event.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(event_type = event.event_type(), "event sink error: {}", e);
            }
        }
    }
}

/// Keeps every event in memory. Cloning shares the buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LedgerEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Other("memory sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
