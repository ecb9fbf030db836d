pub mod account;
pub mod admin;
pub mod auth;
pub mod error;
pub mod extract;
pub mod jokers;
pub mod messages;
pub mod middleware;
pub mod payments;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};
use tracing::error;

use viviana_core::{CoreResult, Viviana};
use viviana_core::accounts::MAX_PROFILE_PIC_BYTES;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{require_admin, require_user};

/// A base64 data URL of the largest allowed picture plus its JSON envelope.
const PROFILE_PIC_BODY_LIMIT: usize = MAX_PROFILE_PIC_BYTES / 3 * 4 + 64 * 1024;

/// Runs a service call off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Viviana) -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let st = state.clone();
    tokio::task::spawn_blocking(move || f(&st.app))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// All HTTP routes. Logging and CORS layers are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/resend", post(auth::resend))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route("/auth/password-reset/verify", post(auth::reset_password))
        .route("/admin/login", post(auth::admin_login))
        .with_state(state.clone());

    let user_routes = Router::new()
        .route("/me", get(account::me).put(account::update_profile).delete(account::delete_me))
        .route("/me/profile", get(account::profile))
        .route(
            "/me/profile-picture",
            put(account::upload_picture).layer(DefaultBodyLimit::max(PROFILE_PIC_BODY_LIMIT)),
        )
        .route("/credits", get(account::balance))
        .route("/credits/ledger", get(account::ledger))
        .route("/rank", get(account::rank))
        .route("/chat/messages", get(messages::get_messages).post(messages::send_message))
        .route("/jokers", get(jokers::list_jokers))
        .route("/jokers/{joker_id}/use", post(jokers::use_joker))
        .route("/packages", get(payments::list_packages))
        .route("/payments", get(payments::list_payments).post(payments::create_payment))
        .layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{user_id}", delete(admin::delete_user))
        .route("/admin/users/{user_id}/credits", post(admin::adjust_credits))
        .route("/admin/users/{user_id}/status", post(admin::set_status))
        .route("/admin/users/{user_id}/verify", post(admin::verify_user))
        .route("/admin/users/{user_id}/purge", post(admin::purge_user))
        .route("/admin/users/{user_id}/jokers/reset", post(admin::reset_jokers))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/purge", post(admin::purge))
        .route("/admin/conversations", get(admin::conversations))
        .route("/admin/conversations/{user_id}", get(admin::open_conversation))
        .route("/admin/conversations/{user_id}/reply", post(admin::reply))
        .route("/admin/conversations/{user_id}/incoming", post(admin::incoming))
        .route("/admin/broadcast", post(admin::broadcast))
        .route("/admin/payments", get(admin::list_payments))
        .route("/admin/payments/{payment_id}/refund", post(admin::refund_payment))
        .route("/admin/payments/{payment_id}/fail", post(admin::fail_payment))
        .route("/admin/security-log", get(admin::security_log))
        .route("/admin/webhooks", get(admin::webhooks))
        .route("/admin/packages", post(admin::add_package))
        .route("/admin/packages/{index}", delete(admin::remove_package))
        .route("/admin/maintenance/consistency", post(admin::check_consistency))
        .route("/admin/maintenance/cleanup", post(admin::cleanup))
        .layer(from_fn_with_state(state.clone(), require_admin))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
}
