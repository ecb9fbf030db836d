use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use viviana_types::api::{
    AdminAdjustRequest, AdminReplyRequest, BroadcastRequest, BroadcastResponse, Claims,
    LedgerEntryResponse, PaymentReasonRequest, PurgeRequest, SetStatusRequest,
};
use viviana_types::models::{CreditPackage, MessageContent};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

// -- Users --

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = run_blocking(&state, |app| app.user_overviews()).await?;
    Ok(Json(users))
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = run_blocking(&state, |app| app.dashboard_stats()).await?;
    Ok(Json(stats))
}

pub async fn adjust_credits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    ApiJson(req): ApiJson<AdminAdjustRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = run_blocking(&state, move |app| {
        app.adjust_credits(user_id, req.amount, &req.reason, &claims.name)
    })
    .await?;

    Ok(Json(LedgerEntryResponse {
        balance: entry.balance_after,
        entry,
    }))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    ApiJson(req): ApiJson<SetStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(&state, move |app| app.set_status(user_id, req.status)).await?;
    Ok(Json(viviana_types::models::User::from(&user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |app| app.soft_delete(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(&state, move |app| app.verify_user(user_id)).await?;
    Ok(Json(viviana_types::models::User::from(&user)))
}

/// Purges by id; reaches soft-deleted accounts whose email was anonymized.
pub async fn purge_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let report = run_blocking(&state, move |app| app.purge_user(user_id)).await?;
    info!("Admin {} purged user {}", claims.name, report.user_id);
    Ok(Json(report))
}

pub async fn purge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PurgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = run_blocking(&state, move |app| app.purge(&req.email))
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No account with that email"))?;

    info!("Admin {} purged user {}", claims.name, report.user_id);
    Ok(Json(report))
}

pub async fn reset_jokers(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |app| app.reset_jokers(user_id)).await?;
    Ok(Json(json!({ "success": true })))
}

// -- Conversations --

pub async fn conversations(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let list = run_blocking(&state, |app| app.conversations()).await?;
    Ok(Json(list))
}

pub async fn open_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_blocking(&state, move |app| app.open_conversation(user_id)).await?;
    Ok(Json(messages))
}

pub async fn reply(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    ApiJson(req): ApiJson<AdminReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = run_blocking(&state, move |app| app.admin_reply(user_id, &req.text)).await?;
    Ok((StatusCode::CREATED, Json(sent.message)))
}

/// Records a companion message (text or media) as if Viviana sent it.
pub async fn incoming(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    ApiJson(content): ApiJson<MessageContent>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = run_blocking(&state, move |app| app.companion_message(user_id, content)).await?;
    Ok((StatusCode::CREATED, Json(sent.message)))
}

pub async fn broadcast(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let delivered = run_blocking(&state, move |app| app.broadcast(&req.text, req.audience)).await?;
    Ok(Json(BroadcastResponse { delivered }))
}

// -- Payments --

pub async fn list_payments(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let payments = run_blocking(&state, |app| app.payments(None)).await?;
    Ok(Json(payments))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    ApiJson(req): ApiJson<PaymentReasonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (payment, entry) =
        run_blocking(&state, move |app| app.refund_payment(payment_id, &req.reason)).await?;
    Ok(Json(json!({ "payment": payment, "entry": entry })))
}

pub async fn fail_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    ApiJson(req): ApiJson<PaymentReasonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = run_blocking(&state, move |app| app.fail_payment(payment_id, &req.reason)).await?;
    Ok(Json(payment))
}

// -- Logs --

pub async fn security_log(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let events = run_blocking(&state, |app| app.security_log()).await?;
    Ok(Json(events))
}

pub async fn webhooks(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let events = run_blocking(&state, |app| app.webhook_log()).await?;
    Ok(Json(events))
}

// -- Packages --

pub async fn add_package(
    State(state): State<AppState>,
    ApiJson(package): ApiJson<CreditPackage>,
) -> Result<impl IntoResponse, ApiError> {
    let packages = run_blocking(&state, move |app| app.add_package(package)).await?;
    Ok((StatusCode::CREATED, Json(packages)))
}

pub async fn remove_package(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = run_blocking(&state, move |app| app.remove_package(index)).await?;
    Ok(Json(removed))
}

// -- Maintenance --

pub async fn check_consistency(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = run_blocking(&state, |app| app.check_consistency()).await?;
    Ok(Json(report))
}

pub async fn cleanup(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let removed = run_blocking(&state, |app| app.cleanup_orphans()).await?;
    Ok(Json(json!({ "removed": removed.len(), "keys": removed })))
}
