use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use viviana_types::api::{Claims, CreatePaymentRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

pub async fn list_packages(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let packages = run_blocking(&state, |app| app.packages()).await?;
    Ok(Json(packages))
}

/// Buys a credit package. The simulated processor settles immediately.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (payment, entry) = run_blocking(&state, move |app| {
        app.purchase_package(claims.sub, req.package_index)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "payment": payment,
            "balance": entry.balance_after,
        })),
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let payments = run_blocking(&state, move |app| app.payments(Some(claims.sub))).await?;
    Ok(Json(payments))
}
