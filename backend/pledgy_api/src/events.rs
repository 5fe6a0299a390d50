//! Persistence of ledger lifecycle events.
//!
//! The ledger hands events to a [`ChannelSink`]; a background task drains the
//! channel into the `events` table.

use pledgy_ledger::{EventSink, LedgerEvent, SinkError};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

use crate::db;
use crate::errors::Result;

/// A ledger event flattened for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEventRow {
    pub epoch: i64,
    pub event_type: String,
    pub goal_id: i64,
    pub actor: Option<String>,
    pub amount: Option<String>,
    pub timestamp: i64,
    pub payload: String,
}

impl NewEventRow {
    pub fn from_event(epoch: i64, event: &LedgerEvent) -> Result<Self> {
        Ok(Self {
            epoch,
            event_type: event.event_type().to_string(),
            goal_id: event.goal_id().0 as i64,
            actor: event.actor().map(ToString::to_string),
            amount: event.amount().map(|amount| amount.to_string()),
            timestamp: event.timestamp() as i64,
            payload: serde_json::to_string(event)?,
        })
    }
}

/// An event record as read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub epoch: i64,
    pub event_type: String,
    pub goal_id: i64,
    pub actor: Option<String>,
    pub amount: Option<String>,
    pub timestamp: i64,
    pub payload: String,
    pub created_at: i64,
}

/// Forwards events to the writer task.
pub struct ChannelSink {
    tx: UnboundedSender<LedgerEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<LedgerEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &LedgerEvent) -> std::result::Result<(), SinkError> {
        self.tx.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Drain `rx` into the `events` table until every sender is gone.
pub async fn run_writer(pool: SqlitePool, epoch: i64, mut rx: UnboundedReceiver<LedgerEvent>) {
    info!("Event writer starting, epoch {epoch}");
    while let Some(event) = rx.recv().await {
        let stored = match NewEventRow::from_event(epoch, &event) {
            Ok(row) => db::insert_event(&pool, &row).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            error!(event_type = event.event_type(), "Failed to persist event: {e}");
        }
    }
    info!("Event writer stopped");
}
