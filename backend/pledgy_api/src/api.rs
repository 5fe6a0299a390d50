//! Axum REST API handlers.
//!
//! Callers are identified by the `x-participant-id` header, set by the
//! identity proxy in front of this service. Amounts travel as decimal strings
//! in the smallest unit (gwei).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use pledgy_ledger::{
    Amount, ClaimRecord, Goal, GoalId, GoalState, LedgerError, NewGoal, Outcome, ParticipantId,
    PermitAuthorization, SharedLedger, Stake, Timestamp, VerificationRule,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::errors::{ApiError, Result};
use crate::events::EventRecord;
use crate::oracle::AttestationOracle;

pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// Source of the ledger's notion of "now", in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        unix_seconds(chrono::Utc::now())
    }
}

/// Instants before the Unix epoch are clamped to it.
fn unix_seconds(at: chrono::DateTime<chrono::Utc>) -> Timestamp {
    let secs = at.timestamp();
    if secs < 0 {
        warn!(secs, "system clock reads before the Unix epoch; clamping to 0");
    }
    secs.max(0) as Timestamp
}

#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<SharedLedger>,
    pub oracle: Arc<AttestationOracle>,
    pub oracle_id: ParticipantId,
    /// Seconds after a deadline that resolution waits for an attestation.
    pub attestation_timeout: Timestamp,
    pub pool: SqlitePool,
    /// Run identifier stamped on persisted events.
    pub epoch: i64,
    pub clock: Arc<dyn Clock>,
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub rule: VerificationRule,
    /// Unix seconds.
    pub deadline: Timestamp,
}

/// A deposit and the permit authorizing it. The permit is bound to the
/// calling participant and to `amount`.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub nonce: u64,
    pub expires_at: Timestamp,
    /// Hex-encoded Ed25519 signature by the permit issuer.
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct AttestationRequest {
    pub met: bool,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GoalView {
    pub id: u64,
    pub creator: String,
    pub title: String,
    pub description: String,
    pub rule: VerificationRule,
    pub deadline: Timestamp,
    pub deadline_at: Option<String>,
    pub created_at: Timestamp,
    pub state: GoalState,
    pub pool: String,
    pub outcome: Option<Outcome>,
    pub dust: String,
    pub claimed_total: String,
    pub resolved_at: Option<Timestamp>,
}

impl From<&Goal> for GoalView {
    fn from(goal: &Goal) -> Self {
        Self {
            id: goal.id.0,
            creator: goal.creator.to_string(),
            title: goal.title.clone(),
            description: goal.description.clone(),
            rule: goal.rule,
            deadline: goal.deadline,
            deadline_at: rfc3339(goal.deadline),
            created_at: goal.created_at,
            state: goal.state,
            pool: goal.pool.to_string(),
            outcome: goal.outcome,
            dust: goal.dust.to_string(),
            claimed_total: goal.claimed_total.to_string(),
            resolved_at: goal.resolved_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StakeView {
    pub id: u64,
    pub participant: String,
    pub amount: String,
    pub deposited_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Stake> for StakeView {
    fn from(stake: &Stake) -> Self {
        Self {
            id: stake.id.0,
            participant: stake.participant.to_string(),
            amount: stake.amount.to_string(),
            deposited_at: stake.deposited_at,
            updated_at: stake.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimView {
    pub participant: String,
    pub amount_paid: String,
    pub claimed_at: Timestamp,
}

impl From<&ClaimRecord> for ClaimView {
    fn from(record: &ClaimRecord) -> Self {
        Self {
            participant: record.participant.to_string(),
            amount_paid: record.amount_paid.to_string(),
            claimed_at: record.claimed_at,
        }
    }
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub goal_id: u64,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct AllEventsResponse {
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /goals`
pub async fn list_goals(State(state): State<Arc<ApiState>>) -> Result<Json<Value>> {
    let goals: Vec<GoalView> = state.ledger.goals()?.iter().map(GoalView::from).collect();
    Ok(Json(json!({ "count": goals.len(), "goals": goals })))
}

/// `POST /goals`
pub async fn create_goal(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<CreateGoalRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let creator = caller(&headers)?;
    let goal = NewGoal {
        title: req.title,
        description: req.description,
        rule: req.rule,
        deadline: req.deadline,
    };
    let id = state.ledger.create_goal(creator, goal, state.clock.now())?;
    let goal = state.ledger.get_goal(id)?;
    Ok((StatusCode::CREATED, Json(json!(GoalView::from(&goal)))))
}

/// `GET /goals/:id`
pub async fn get_goal(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
) -> Result<Json<Value>> {
    let goal = state.ledger.get_goal(GoalId(goal_id))?;
    Ok(Json(json!(GoalView::from(&goal))))
}

/// `GET /goals/:id/stakes`
///
/// Stakes in deposit order.
pub async fn get_stakes(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
) -> Result<Json<Value>> {
    let stakes: Vec<StakeView> = state
        .ledger
        .stakes_for(GoalId(goal_id))?
        .iter()
        .map(StakeView::from)
        .collect();
    Ok(Json(json!({
        "goal_id": goal_id,
        "count": stakes.len(),
        "stakes": stakes,
    })))
}

/// `GET /goals/:id/claims`
pub async fn get_claims(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
) -> Result<Json<Value>> {
    let claims: Vec<ClaimView> = state
        .ledger
        .claims_for(GoalId(goal_id))?
        .iter()
        .map(ClaimView::from)
        .collect();
    Ok(Json(json!({
        "goal_id": goal_id,
        "count": claims.len(),
        "claims": claims,
    })))
}

/// `POST /goals/:id/deposits`
pub async fn deposit(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<DepositRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let participant = caller(&headers)?;
    let amount = parse_amount(&req.amount)?;
    let signature = hex::decode(req.signature.trim())
        .map_err(|_| ApiError::BadRequest("signature must be hex".to_string()))?;
    let permit = PermitAuthorization {
        participant: participant.clone(),
        amount,
        nonce: req.nonce,
        expires_at: req.expires_at,
        signature,
    };

    let goal_id = GoalId(goal_id);
    let stake_id = state
        .ledger
        .deposit(goal_id, &participant, amount, permit, state.clock.now())?;
    let goal = state.ledger.get_goal(goal_id)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "stake_id": stake_id.0,
            "goal_id": goal_id.0,
            "participant": participant.as_str(),
            "amount": amount.to_string(),
            "pool": goal.pool.to_string(),
        })),
    ))
}

/// `POST /goals/:id/attestation`
///
/// Records the oracle's verdict ahead of resolution. The goal is checked and
/// the verdict stored under the ledger lock, so a verdict is either seen by
/// resolution or refused.
pub async fn attest(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<AttestationRequest>,
) -> Result<Json<Value>> {
    if caller(&headers)? != state.oracle_id {
        return Err(ApiError::Forbidden(
            "only the outcome oracle may attest".to_string(),
        ));
    }
    let goal_id = GoalId(goal_id);
    state
        .ledger
        .while_open(goal_id, |_| state.oracle.attest(goal_id, req.met))?;
    Ok(Json(json!({ "goal_id": goal_id.0, "met": req.met })))
}

/// `POST /goals/:id/resolve`
///
/// Until the oracle has attested, resolution waits `attestation_timeout`
/// seconds past the deadline; after that a missing verdict counts as failure.
pub async fn resolve(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
) -> Result<Json<Value>> {
    let goal_id = GoalId(goal_id);
    let now = state.clock.now();
    let goal = state.ledger.get_goal(goal_id)?;
    if goal.state == GoalState::Open
        && state.oracle.attestation(goal_id).is_none()
        && now < goal.deadline.saturating_add(state.attestation_timeout)
    {
        info!(goal_id = %goal_id, "resolution deferred; awaiting attestation");
        return Err(LedgerError::TooEarly(goal_id).into());
    }

    let outcome = state.ledger.resolve(goal_id, now)?;
    let goal = state.ledger.get_goal(goal_id)?;
    Ok(Json(json!({
        "goal_id": goal_id.0,
        "outcome": outcome,
        "state": goal.state,
        "dust": goal.dust.to_string(),
    })))
}

/// `GET /goals/:id/claimable`
///
/// What the caller could claim right now.
pub async fn claimable(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let participant = caller(&headers)?;
    let amount = state.ledger.entitlement(GoalId(goal_id), &participant)?;
    Ok(Json(json!({
        "goal_id": goal_id,
        "participant": participant.as_str(),
        "amount": amount.to_string(),
    })))
}

/// `POST /goals/:id/claim`
pub async fn claim(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let participant = caller(&headers)?;
    let paid = state
        .ledger
        .claim(GoalId(goal_id), &participant, state.clock.now())?;
    Ok(Json(json!({
        "goal_id": goal_id,
        "participant": participant.as_str(),
        "amount_paid": paid.to_string(),
    })))
}

/// `POST /goals/:id/close`
///
/// Ends the claim window once the grace period has elapsed.
pub async fn close(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
) -> Result<Json<Value>> {
    let dust = state
        .ledger
        .close_expired(GoalId(goal_id), state.clock.now())?;
    Ok(Json(json!({ "goal_id": goal_id, "dust": dust.to_string() })))
}

/// `GET /goals/:id/events`
///
/// Returns the persisted events of a goal from the current run.
pub async fn get_goal_events(
    State(state): State<Arc<ApiState>>,
    Path(goal_id): Path<u64>,
) -> Result<Json<Value>> {
    state.ledger.get_goal(GoalId(goal_id))?;
    let events = db::get_events_for_goal(&state.pool, state.epoch, goal_id as i64).await?;
    let count = events.len();
    Ok(Json(json!(EventsResponse {
        goal_id,
        count,
        events,
    })))
}

/// `GET /events`
///
/// Returns every persisted event, across runs.
pub async fn get_all_events(State(state): State<Arc<ApiState>>) -> Result<Json<Value>> {
    let events = db::get_all_events(&state.pool).await?;
    let count = events.len();
    Ok(Json(json!(AllEventsResponse { count, events })))
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn caller(headers: &HeaderMap) -> Result<ParticipantId> {
    headers
        .get(PARTICIPANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ParticipantId::new)
        .ok_or(ApiError::MissingIdentity)
}

fn parse_amount(raw: &str) -> Result<Amount> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid amount: {raw:?}")))
}

fn rfc3339(ts: Timestamp) -> Option<String> {
    let secs = i64::try_from(ts).ok()?;
    chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
