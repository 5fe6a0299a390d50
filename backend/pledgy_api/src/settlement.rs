//! Delivery of settlement requests to the value-transfer service.
//!
//! ## Resilience
//!
//! * A recorder writes every request to the `settlements` outbox the moment it
//!   arrives, independent of delivery, so nothing is lost across restarts.
//! * A separate deliverer drains `pending` rows oldest first, on start and
//!   whenever the recorder adds one.
//! * Exponential back-off is applied when the endpoint is unreachable, rate
//!   limits, or fails with a 5xx, up to [`MAX_BACKOFF_SECS`] seconds.
//! * Any other non-2xx response leaves the row `pending` for the next start.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pledgy_ledger::{SettlementRequest, SettlementSink, SinkError};
use reqwest::Client;
use sqlx::SqlitePool;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::db::{self, SettlementRecord};
use crate::errors::{ApiError, Result};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

/// Forwards requests to the dispatcher task.
pub struct ChannelSettlement {
    tx: UnboundedSender<SettlementRequest>,
}

impl ChannelSettlement {
    pub fn new(tx: UnboundedSender<SettlementRequest>) -> Self {
        Self { tx }
    }
}

impl SettlementSink for ChannelSettlement {
    fn authorize_transfer(&self, request: &SettlementRequest) -> std::result::Result<(), SinkError> {
        self.tx.send(request.clone()).map_err(|_| SinkError::Closed)
    }
}

pub struct SettlementState {
    pub pool: SqlitePool,
    pub client: Client,
    /// Unset: requests are recorded but never sent.
    pub url: Option<String>,
}

/// Record every request arriving on `rx` and, with an endpoint configured,
/// deliver the outbox in the background. Returns once `rx` closes; rows
/// still pending then are picked up on the next start.
pub async fn run(state: Arc<SettlementState>, mut rx: UnboundedReceiver<SettlementRequest>) {
    let wake = Arc::new(Notify::new());
    let deliverer = match state.url.clone() {
        Some(url) => {
            info!("Settlement dispatcher starting, endpoint: {url}");
            Some(tokio::spawn(deliver_pending(
                Arc::clone(&state),
                url,
                Arc::clone(&wake),
            )))
        }
        None => {
            warn!("SETTLEMENT_URL not set; settlement requests are only recorded");
            None
        }
    };

    while let Some(request) = rx.recv().await {
        match db::insert_settlement(&state.pool, &request).await {
            Ok(id) => {
                debug!(id, to = %request.to, amount = request.amount, "Settlement recorded");
                wake.notify_one();
            }
            Err(e) => {
                error!(to = %request.to, amount = request.amount, "Failed to record settlement: {e}")
            }
        }
    }

    if let Some(handle) = deliverer {
        handle.abort();
    }
    info!("Settlement dispatcher stopped");
}

/// Deliver `pending` rows oldest first, then sleep until woken.
async fn deliver_pending(state: Arc<SettlementState>, url: String, wake: Arc<Notify>) {
    // Rejected by the endpoint during this run; retried after a restart.
    let mut rejected: HashSet<i64> = HashSet::new();

    loop {
        match db::pending_settlements(&state.pool).await {
            Ok(pending) => {
                for record in pending.iter() {
                    if rejected.contains(&record.id) {
                        continue;
                    }
                    if let Err(e) = deliver_record(&state, &url, record).await {
                        error!(id = record.id, to = %record.target, "Settlement delivery failed: {e}");
                        rejected.insert(record.id);
                    }
                }
            }
            Err(e) => error!("Failed to load pending settlements: {e}"),
        }
        wake.notified().await;
    }
}

async fn deliver_record(state: &SettlementState, url: &str, record: &SettlementRecord) -> Result<()> {
    let body: serde_json::Value = serde_json::from_str(&record.payload)?;
    post_with_backoff(&state.client, url, &body).await?;
    db::mark_settlement_delivered(&state.pool, record.id, chrono::Utc::now().timestamp()).await?;
    info!(id = record.id, "Settlement delivered");
    Ok(())
}

/// POST `body` until the endpoint answers 2xx or a non-retryable status.
pub async fn post_with_backoff(client: &Client, url: &str, body: &serde_json::Value) -> Result<()> {
    let mut backoff = INITIAL_BACKOFF_SECS;

    loop {
        match client.post(url).json(body).send().await {
            Err(e) => {
                warn!("Settlement request failed (will retry in {backoff}s): {e}");
            }
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(());
                }
                if status != reqwest::StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                    return Err(ApiError::Settlement(format!("status {status}")));
                }
                warn!("Settlement endpoint answered {status} (will retry in {backoff}s)");
            }
        }
        tokio::time::sleep(Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}
