use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use viviana_core::Viviana;
use viviana_core::admin::AdminAuth;
use viviana_types::api::{
    AdminLoginRequest, AdminLoginResponse, Claims, LoginRequest, LoginResponse,
    PasswordResetConfirmRequest, PasswordResetRequest, ResendVerificationRequest, Role,
    SignupRequest, SignupResponse, VerifyEmailRequest,
};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

pub const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub app: Viviana,
    pub jwt_secret: String,
    pub admin: AdminAuth,
}

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (created, balance) = run_blocking(&state, move |app| {
        let created = app.signup(&req.name, &req.email, &req.password)?;
        let balance = app.balance(created.user.id)?;
        Ok((created, balance))
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user_id: created.user.id,
            email_verified: created.user.email_verified,
            balance,
        }),
    ))
}

pub async fn verify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(&state, move |app| app.verify_email(&req.email, &req.code)).await?;
    Ok(Json(json!({ "success": true, "user_id": user.id })))
}

pub async fn resend(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResendVerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |app| app.resend_verification(&req.email)).await?;
    Ok(Json(json!({ "success": true })))
}

/// Answers the same way whether or not the email is registered.
pub async fn request_password_reset(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |app| app.request_password_reset(&req.email)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "If an account exists for this email, a reset code has been sent",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |app| {
        app.reset_password(&req.email, &req.code, &req.new_password)
    })
    .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(&state, move |app| app.login(&req.email, &req.password)).await?;

    let token = create_token(&state.jwt_secret, user.id, &user.name, Role::User)
        .map_err(|_| ApiError::internal())?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        name: user.name,
        token,
    }))
}

pub async fn admin_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdminLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let st = state.clone();
    // argon2 verification is CPU-bound
    let ok = tokio::task::spawn_blocking(move || st.admin.verify(&req.username, &req.password))
        .await
        .map_err(|_| ApiError::internal())?;

    if !ok {
        warn!("Rejected admin login for {:?}", username);
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid admin credentials"));
    }

    let token = create_token(&state.jwt_secret, Uuid::nil(), state.admin.username(), Role::Admin)
        .map_err(|_| ApiError::internal())?;
    info!("Admin {} logged in", state.admin.username());
    Ok(Json(AdminLoginResponse { token }))
}

pub fn create_token(secret: &str, subject: Uuid, name: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: subject,
        name: name.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
