use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use viviana_core::jokers::JokerOutcome;
use viviana_types::api::{Claims, UseJokerResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

pub async fn list_jokers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cards = run_blocking(&state, move |app| app.jokers(claims.sub)).await?;
    Ok(Json(cards))
}

pub async fn use_joker(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(joker_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (outcome, balance) =
        run_blocking(&state, move |app| app.use_joker(claims.sub, &joker_id)).await?;

    let body = match outcome {
        JokerOutcome::Activated { entry, .. } => UseJokerResponse::Activated { entry, balance },
        JokerOutcome::AlreadyUsed { .. } => UseJokerResponse::AlreadyUsed { balance },
    };
    Ok(Json(body))
}
