use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tripool_core::payment::{ParticipantPayment, PaymentStatus, ThresholdView};
use tripool_coordinator::StatusReport;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub host_id: Uuid,
    pub total_cost: i64,
    pub min_participants: i32,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub config_id: Uuid,
    pub per_seat_amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub participant_id: Uuid,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub hold_ref: String,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub threshold_view: ThresholdView,
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub status: PaymentStatus,
    pub threshold_view: ThresholdView,
}

#[derive(Debug, Deserialize)]
pub struct IssueCardRequest {
    pub actor_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IssueCardResponse {
    pub card_ref: String,
    pub last_four: String,
    pub brand: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub funded_amount: i64,
    pub already_exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub actor_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub captured: Vec<Uuid>,
    pub failed: Vec<CaptureFailureView>,
}

#[derive(Debug, Serialize)]
pub struct CaptureFailureView {
    pub participant_id: Uuid,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub participant_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub status: PaymentStatus,
    pub threshold_view: ThresholdView,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub configuration: ConfigurationView,
    pub participants: Vec<ParticipantView>,
    pub threshold_view: ThresholdView,
}

#[derive(Debug, Serialize)]
pub struct ConfigurationView {
    pub trip_id: Uuid,
    pub total_cost: i64,
    pub currency: String,
    pub min_participants: i32,
    pub per_seat_amount: i64,
    pub virtual_card_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ParticipantView {
    pub participant_id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&ParticipantPayment> for ParticipantView {
    fn from(record: &ParticipantPayment) -> Self {
        Self {
            participant_id: record.participant_id,
            status: record.status,
            amount: record.amount,
            currency: record.currency.clone(),
            created_at: record.created_at,
        }
    }
}

impl From<StatusReport> for StatusResponse {
    fn from(report: StatusReport) -> Self {
        let configuration = ConfigurationView {
            trip_id: report.configuration.trip_id,
            total_cost: report.configuration.total_cost,
            currency: report.configuration.currency.clone(),
            min_participants: report.configuration.min_participants,
            per_seat_amount: report.configuration.per_seat_amount,
            virtual_card_ref: report
                .configuration
                .virtual_card
                .as_ref()
                .map(|card| card.card_ref.clone()),
        };
        Self {
            configuration,
            participants: report.participants.iter().map(ParticipantView::from).collect(),
            threshold_view: report.threshold,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/trips/{trip_id}/payments/setup
/// Create the trip's payment configuration.
pub async fn setup_payments(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<SetupRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .coordinator
        .setup(
            trip_id,
            req.host_id,
            req.total_cost,
            &req.currency,
            req.min_participants,
        )
        .await?;

    let body = SetupResponse {
        config_id: outcome.config.trip_id,
        per_seat_amount: outcome.config.per_seat_amount,
        currency: outcome.config.currency,
    };

    // An existing configuration is a conflict on the wire, but the body
    // carries it so callers can treat the call as success-with-existing.
    let status = if outcome.created {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(body)).into_response())
}

/// POST /v1/trips/{trip_id}/payments/join
/// Join the trip by preauthorizing the per-seat amount.
pub async fn join_with_payment(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let outcome = state
        .coordinator
        .join_with_payment(trip_id, req.participant_id, req.payment_method.as_deref())
        .await?;

    Ok(Json(JoinResponse {
        hold_ref: outcome.hold_ref,
        amount: outcome.amount,
        currency: outcome.currency,
        client_secret: outcome.client_secret,
        threshold_view: outcome.threshold,
    }))
}

/// DELETE /v1/trips/{trip_id}/payments/participants/{participant_id}
/// Void a participant's hold. Host only.
pub async fn remove_participant(
    State(state): State<AppState>,
    Path((trip_id, participant_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let outcome = state
        .coordinator
        .remove_participant(trip_id, participant_id, query.actor_id)
        .await?;

    Ok(Json(RemoveResponse {
        status: PaymentStatus::Voided,
        threshold_view: outcome.threshold,
    }))
}

/// POST /v1/trips/{trip_id}/payments/card
/// Issue the virtual card once the threshold is met. Host only.
pub async fn issue_virtual_card(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<IssueCardRequest>,
) -> Result<Json<IssueCardResponse>, ApiError> {
    let outcome = state
        .coordinator
        .issue_virtual_card(trip_id, req.actor_id)
        .await?;

    Ok(Json(IssueCardResponse {
        card_ref: outcome.card.card_ref,
        last_four: outcome.card.last_four,
        brand: outcome.card.brand,
        exp_month: outcome.card.exp_month,
        exp_year: outcome.card.exp_year,
        funded_amount: outcome.funded_amount,
        already_exists: outcome.already_exists,
    }))
}

/// POST /v1/trips/{trip_id}/payments/capture
/// Capture all authorized holds after booking. Host only.
pub async fn capture_payments(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let outcome = state
        .coordinator
        .capture_payments(trip_id, req.actor_id)
        .await?;

    Ok(Json(CaptureResponse {
        captured: outcome.captured,
        failed: outcome
            .failed
            .into_iter()
            .map(|f| CaptureFailureView {
                participant_id: f.participant_id,
                error: f.error,
            })
            .collect(),
    }))
}

/// POST /v1/trips/{trip_id}/payments/reconcile
/// Resolve a payment stranded in `pending` by a gateway timeout.
pub async fn reconcile_pending(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let outcome = state
        .coordinator
        .reconcile_pending(trip_id, req.participant_id)
        .await?;

    Ok(Json(ReconcileResponse {
        status: outcome.status,
        threshold_view: outcome.threshold,
    }))
}

/// GET /v1/trips/{trip_id}/payments
/// Configuration, participant list, and a freshly computed threshold view.
pub async fn get_status(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let report = state.coordinator.get_status(trip_id).await?;
    Ok(Json(report.into()))
}
