use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use viviana_types::api::{Claims, SendMessageResponse};
use viviana_types::models::MessageContent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Polling cursor: id of the newest message the client already has.
    pub after: Option<Uuid>,
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages =
        run_blocking(&state, move |app| app.messages_after(claims.sub, query.after)).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(content): ApiJson<MessageContent>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = run_blocking(&state, move |app| app.send_message(claims.sub, content)).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: sent.message,
            balance: sent.balance,
            level: sent.rank.level_after,
            leveled_up: sent.rank.leveled_up,
        }),
    ))
}
