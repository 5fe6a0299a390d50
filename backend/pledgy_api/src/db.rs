//! Database layer: migrations, event log and settlement outbox.

use std::str::FromStr;

use pledgy_ledger::SettlementRequest;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, NewEventRow};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    init_pool_with(database_url, 5).await
}

/// Like [`init_pool`] with an explicit pool size. In-memory databases need
/// a single connection, since each connection sees its own database.
pub async fn init_pool_with(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Event writes
// ─────────────────────────────────────────────────────────

/// Persist one event. Redelivered events hit the unique key and are
/// silently ignored; returns the number of rows written.
pub async fn insert_event(pool: &SqlitePool, ev: &NewEventRow) -> Result<u64> {
    let rows_affected = sqlx::query(
        r#"
        INSERT OR IGNORE INTO events
            (epoch, event_type, goal_id, actor, amount, timestamp, payload)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(ev.epoch)
    .bind(&ev.event_type)
    .bind(ev.goal_id)
    .bind(&ev.actor)
    .bind(&ev.amount)
    .bind(ev.timestamp)
    .bind(&ev.payload)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows_affected)
}

// ─────────────────────────────────────────────────────────
// Event reads
// ─────────────────────────────────────────────────────────

/// Fetch the events of one goal in the given epoch, oldest first.
pub async fn get_events_for_goal(
    pool: &SqlitePool,
    epoch: i64,
    goal_id: i64,
) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, epoch, event_type, goal_id, actor, amount, timestamp,
               payload, created_at
        FROM   events
        WHERE  epoch = ?1 AND goal_id = ?2
        ORDER  BY timestamp ASC, id ASC
        "#,
    )
    .bind(epoch)
    .bind(goal_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch all events across epochs, in insertion order.
pub async fn get_all_events(pool: &SqlitePool) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, epoch, event_type, goal_id, actor, amount, timestamp,
               payload, created_at
        FROM   events
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Settlement outbox
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SettlementRecord {
    pub id: i64,
    pub target: String,
    pub amount: String,
    pub memo: String,
    pub payload: String,
    pub status: String,
    pub created_at: i64,
    pub delivered_at: Option<i64>,
}

/// Record a settlement request as `pending`. Returns its row id.
pub async fn insert_settlement(pool: &SqlitePool, request: &SettlementRequest) -> Result<i64> {
    let payload = serde_json::to_string(request)?;
    let id = sqlx::query(
        r#"
        INSERT INTO settlements (target, amount, memo, payload)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(request.to.to_string())
    .bind(request.amount.to_string())
    .bind(&request.memo)
    .bind(payload)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn mark_settlement_delivered(pool: &SqlitePool, id: i64, delivered_at: i64) -> Result<()> {
    sqlx::query("UPDATE settlements SET status = 'delivered', delivered_at = ?1 WHERE id = ?2")
        .bind(delivered_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Settlements not yet acknowledged by the transfer service, oldest first.
pub async fn pending_settlements(pool: &SqlitePool) -> Result<Vec<SettlementRecord>> {
    let rows = sqlx::query_as::<_, SettlementRecord>(
        r#"
        SELECT id, target, amount, memo, payload, status, created_at, delivered_at
        FROM   settlements
        WHERE  status = 'pending'
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
