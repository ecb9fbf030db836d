use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use viviana_types::api::{Claims, Role};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

fn decode_bearer(req: &Request, secret: &str) -> Result<Claims, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(ApiError::unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::unauthorized())?;

    Ok(token_data.claims)
}

/// Accepts user tokens whose account is still active.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = decode_bearer(&req, &state.jwt_secret)?;
    if claims.role != Role::User {
        return Err(ApiError::forbidden());
    }

    // blocked or deleted after the token was issued
    let user_id = claims.sub;
    run_blocking(&state, move |app| app.active_user(user_id)).await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = decode_bearer(&req, &state.jwt_secret)?;
    if claims.role != Role::Admin {
        return Err(ApiError::forbidden());
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
