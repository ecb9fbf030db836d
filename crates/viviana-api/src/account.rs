use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::json;

use viviana_types::api::{BalanceResponse, Claims, ProfilePictureRequest, UpdateProfileRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

/// Profile, credit totals and rank of the caller.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let overview = run_blocking(&state, move |app| app.overview(claims.sub)).await?;
    Ok(Json(overview))
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = run_blocking(&state, move |app| app.balance(claims.sub)).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub async fn ledger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = run_blocking(&state, move |app| app.ledger(claims.sub)).await?;
    Ok(Json(entries))
}

pub async fn rank(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let info = run_blocking(&state, move |app| app.rank(claims.sub)).await?;
    Ok(Json(info))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = run_blocking(&state, move |app| app.profile(claims.sub)).await?;
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile =
        run_blocking(&state, move |app| app.update_profile(claims.sub, &req.name, &req.bio)).await?;
    Ok(Json(profile))
}

pub async fn upload_picture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ProfilePictureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile =
        run_blocking(&state, move |app| app.set_profile_picture(claims.sub, &req.image)).await?;
    Ok(Json(profile))
}

/// Deletes the caller's account. Existing tokens stop working.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |app| app.delete_account(claims.sub)).await?;
    Ok(Json(json!({ "success": true })))
}
