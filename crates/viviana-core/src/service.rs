//! Application service: one method per user-facing or admin operation.
//!
//! Each write runs as a single storage transaction, so a failure anywhere in
//! an operation leaves no partial state behind.

use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use viviana_db::Database;
use viviana_types::events::{SecurityEvent, WebhookEvent};
use viviana_types::models::{
    BroadcastAudience, ConversationSummary, CreditPackage, DashboardStats, JokerCard,
    LedgerEntry, Message, MessageContent, Payment, RankInfo, UserOverview, UserProfile,
    UserRecord, UserStatus,
};

use crate::accounts::{self, PurgeReport, Signup};
use crate::admin::{self, ConsistencyReport};
use crate::chat::{self, SentMessage};
use crate::error::{CoreError, CoreResult};
use crate::jokers::{self, JokerOutcome};
use crate::{audit, ledger, payments, rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Credits granted on signup.
    pub initial_credits: i64,
    /// Credits charged per user message.
    pub message_cost: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_credits: 3,
            message_cost: 1,
        }
    }
}

pub struct Viviana {
    db: Database,
    settings: Settings,
}

impl Viviana {
    pub fn new(db: Database, settings: Settings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Security events for rejected operations. Written in their own
    /// transaction since the failed operation's transaction was rolled back.
    fn log_rejection(&self, event_type: &str, details: serde_json::Value) {
        if let Err(e) = self
            .db
            .transaction(|s| audit::log_security_event(s, event_type, details))
        {
            warn!("Failed to record {} event: {}", event_type, e);
        }
    }

    // -- Accounts --

    pub fn signup(&self, name: &str, email: &str, password: &str) -> CoreResult<Signup> {
        let result = self.db.transaction(|s| {
            accounts::signup(s, name, email, password, self.settings.initial_credits)
        });
        if let Err(e) = &result {
            self.log_rejection(
                "signup_failed",
                json!({ "email": accounts::normalize_email(email), "reason": e.to_string() }),
            );
        }
        result
    }

    pub fn login(&self, email: &str, password: &str) -> CoreResult<UserRecord> {
        let result = self.db.transaction(|s| accounts::login(s, email, password));
        if let Err(e) = &result {
            self.log_rejection(
                "failed_login",
                json!({ "email": accounts::normalize_email(email), "reason": e.to_string() }),
            );
        }
        result
    }

    pub fn verify_email(&self, email: &str, code: &str) -> CoreResult<UserRecord> {
        self.db
            .transaction(|s| accounts::verify_email(s, email, code, Utc::now()))
    }

    /// Issues a new verification code for an unverified account.
    pub fn resend_verification(&self, email: &str) -> CoreResult<()> {
        self.db.transaction(|s| {
            let user = accounts::find_by_email(s, email)?
                .ok_or(CoreError::InvalidVerificationCode)?;
            if !user.email_verified {
                accounts::issue_verification_code(s, user.id)?;
            }
            Ok(())
        })
    }

    /// Returns the reset code, or `None` for an unknown email. Callers must
    /// answer both cases the same way.
    pub fn request_password_reset(&self, email: &str) -> CoreResult<Option<String>> {
        self.db.transaction(|s| accounts::request_password_reset(s, email))
    }

    pub fn reset_password(&self, email: &str, code: &str, new_password: &str) -> CoreResult<UserRecord> {
        let result = self
            .db
            .transaction(|s| accounts::reset_password(s, email, code, new_password, Utc::now()));
        if let Err(e @ (CoreError::InvalidVerificationCode | CoreError::Validation(_))) = &result {
            self.log_rejection(
                "password_reset_failed",
                json!({ "email": accounts::normalize_email(email), "reason": e.to_string() }),
            );
        }
        result
    }

    pub fn user(&self, user_id: Uuid) -> CoreResult<UserRecord> {
        self.db.read(|s| accounts::get(s, user_id))
    }

    /// Resolves a token subject to an account that may still use the app.
    pub fn active_user(&self, user_id: Uuid) -> CoreResult<UserRecord> {
        self.db.read(|s| accounts::require_active(s, user_id))
    }

    pub fn overview(&self, user_id: Uuid) -> CoreResult<UserOverview> {
        self.db.read(|s| admin::user_overview(s, user_id))
    }

    pub fn profile(&self, user_id: Uuid) -> CoreResult<UserProfile> {
        self.db.read(|s| accounts::profile(s, user_id))
    }

    pub fn update_profile(&self, user_id: Uuid, name: &str, bio: &str) -> CoreResult<UserProfile> {
        self.db
            .transaction(|s| accounts::update_profile(s, user_id, name, bio))
    }

    pub fn set_profile_picture(&self, user_id: Uuid, image: &str) -> CoreResult<UserProfile> {
        self.db
            .transaction(|s| accounts::set_profile_picture(s, user_id, image))
    }

    /// Self-service account deletion.
    pub fn delete_account(&self, user_id: Uuid) -> CoreResult<UserRecord> {
        self.db.transaction(|s| {
            accounts::require_active(s, user_id)?;
            accounts::soft_delete(s, user_id)
        })
    }

    // -- Credits --

    pub fn balance(&self, user_id: Uuid) -> CoreResult<i64> {
        self.db.read(|s| ledger::balance(s, user_id))
    }

    pub fn ledger(&self, user_id: Uuid) -> CoreResult<Vec<LedgerEntry>> {
        self.db.read(|s| ledger::entries(s, user_id))
    }

    // -- Chat --

    pub fn send_message(&self, user_id: Uuid, content: MessageContent) -> CoreResult<SentMessage> {
        self.db.transaction(|s| {
            chat::send_user_message(s, user_id, content, self.settings.message_cost)
        })
    }

    pub fn messages_after(&self, user_id: Uuid, after: Option<Uuid>) -> CoreResult<Vec<Message>> {
        self.db.read(|s| chat::messages_after(s, user_id, after))
    }

    // -- Rank & jokers --

    pub fn rank(&self, user_id: Uuid) -> CoreResult<RankInfo> {
        self.db.read(|s| Ok(rank::rank_info(rank::progress(s, user_id)?)))
    }

    pub fn jokers(&self, user_id: Uuid) -> CoreResult<Vec<JokerCard>> {
        self.db.read(|s| jokers::cards(s, user_id))
    }

    /// Uses a joker and returns the outcome with the resulting balance.
    pub fn use_joker(&self, user_id: Uuid, joker_id: &str) -> CoreResult<(JokerOutcome, i64)> {
        self.db.transaction(|s| {
            accounts::require_active(s, user_id)?;
            let outcome = jokers::use_joker(s, user_id, joker_id)?;
            let balance = match &outcome {
                JokerOutcome::Activated { entry, .. } => entry.balance_after,
                JokerOutcome::AlreadyUsed { .. } => ledger::balance(s, user_id)?,
            };
            Ok((outcome, balance))
        })
    }

    // -- Payments --

    pub fn packages(&self) -> CoreResult<Vec<CreditPackage>> {
        self.db.read(|s| payments::packages(s))
    }

    pub fn purchase_package(&self, user_id: Uuid, index: usize) -> CoreResult<(Payment, LedgerEntry)> {
        self.db
            .transaction(|s| payments::purchase_package(s, user_id, index))
    }

    pub fn payments(&self, user_id: Option<Uuid>) -> CoreResult<Vec<Payment>> {
        self.db.read(|s| payments::list(s, user_id))
    }

    // -- Admin --

    pub fn user_overviews(&self) -> CoreResult<Vec<UserOverview>> {
        self.db.read(|s| admin::user_overviews(s))
    }

    pub fn dashboard_stats(&self) -> CoreResult<DashboardStats> {
        self.db.read(|s| admin::dashboard_stats(s, Utc::now()))
    }

    pub fn adjust_credits(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        admin_id: &str,
    ) -> CoreResult<LedgerEntry> {
        self.db.transaction(|s| {
            accounts::get(s, user_id)?;
            ledger::admin_adjust(s, user_id, amount, reason, admin_id)
        })
    }

    pub fn set_status(&self, user_id: Uuid, status: UserStatus) -> CoreResult<UserRecord> {
        self.db
            .transaction(|s| accounts::set_status(s, user_id, status))
    }

    pub fn soft_delete(&self, user_id: Uuid) -> CoreResult<UserRecord> {
        self.db.transaction(|s| accounts::soft_delete(s, user_id))
    }

    /// Marks an account verified on the user's behalf.
    pub fn verify_user(&self, user_id: Uuid) -> CoreResult<UserRecord> {
        self.db.transaction(|s| accounts::mark_verified(s, user_id))
    }

    pub fn purge(&self, email: &str) -> CoreResult<Option<PurgeReport>> {
        self.db.transaction(|s| accounts::purge_by_email(s, email))
    }

    pub fn purge_user(&self, user_id: Uuid) -> CoreResult<PurgeReport> {
        self.db.transaction(|s| accounts::purge(s, user_id))
    }

    pub fn conversations(&self) -> CoreResult<Vec<ConversationSummary>> {
        self.db.read(|s| chat::conversations(s))
    }

    /// Full history for the admin view. Opening a conversation marks the
    /// user's messages read.
    pub fn open_conversation(&self, user_id: Uuid) -> CoreResult<Vec<Message>> {
        self.db.transaction(|s| {
            accounts::get(s, user_id)?;
            chat::mark_user_messages_read(s, user_id)?;
            chat::history(s, user_id)
        })
    }

    pub fn admin_reply(&self, user_id: Uuid, text: &str) -> CoreResult<SentMessage> {
        self.db.transaction(|s| chat::send_admin_reply(s, user_id, text))
    }

    pub fn companion_message(&self, user_id: Uuid, content: MessageContent) -> CoreResult<SentMessage> {
        self.db
            .transaction(|s| chat::receive_companion_message(s, user_id, content))
    }

    pub fn broadcast(&self, text: &str, audience: BroadcastAudience) -> CoreResult<usize> {
        self.db
            .transaction(|s| chat::broadcast(s, text, audience, Utc::now()))
    }

    pub fn refund_payment(&self, payment_id: Uuid, reason: &str) -> CoreResult<(Payment, LedgerEntry)> {
        self.db
            .transaction(|s| payments::refund(s, payment_id, reason))
    }

    pub fn fail_payment(&self, payment_id: Uuid, reason: &str) -> CoreResult<Payment> {
        self.db.transaction(|s| payments::fail(s, payment_id, reason))
    }

    pub fn security_log(&self) -> CoreResult<Vec<SecurityEvent>> {
        self.db.read(|s| audit::security_log(s))
    }

    pub fn webhook_log(&self) -> CoreResult<Vec<WebhookEvent>> {
        self.db.read(|s| audit::webhook_log(s))
    }

    pub fn add_package(&self, package: CreditPackage) -> CoreResult<Vec<CreditPackage>> {
        self.db.transaction(|s| payments::add_package(s, package))
    }

    pub fn remove_package(&self, index: usize) -> CoreResult<CreditPackage> {
        self.db.transaction(|s| payments::remove_package(s, index))
    }

    pub fn check_consistency(&self) -> CoreResult<ConsistencyReport> {
        self.db.transaction(|s| admin::check_data_consistency(s))
    }

    pub fn cleanup_orphans(&self) -> CoreResult<Vec<String>> {
        self.db.transaction(|s| admin::cleanup_orphaned_data(s))
    }

    pub fn reset_jokers(&self, user_id: Uuid) -> CoreResult<()> {
        self.db.transaction(|s| {
            accounts::get(s, user_id)?;
            jokers::reset(s, user_id)
        })
    }
}
