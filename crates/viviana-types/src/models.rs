use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Credits --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    Purchase,
    Spend,
    AdminAdjust,
    Refund,
    InitialGrant,
}

impl fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Purchase => "purchase",
            Self::Spend => "spend",
            Self::AdminAdjust => "admin_adjust",
            Self::Refund => "refund",
            Self::InitialGrant => "initial_grant",
        };
        f.write_str(s)
    }
}

/// One immutable line of a user's credits ledger.
///
/// `balance_after` is always `balance_before + amount`; debits carry a
/// negative amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: LedgerEventType,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LedgerEntry {
    pub fn is_balanced(&self) -> bool {
        self.balance_before + self.amount == self.balance_after
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    pub name: String,
    pub credits: i64,
    pub price_cents: i64,
}

impl CreditPackage {
    pub fn defaults() -> Vec<CreditPackage> {
        vec![
            CreditPackage { name: "Starter".into(), credits: 10, price_cents: 99 },
            CreditPackage { name: "Popular".into(), credits: 50, price_cents: 449 },
            CreditPackage { name: "Pro".into(), credits: 200, price_cents: 1599 },
        ]
    }
}

// -- Users --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
    Deleted,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A registered user as stored under `VIVIANA_USERS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// User record without the credential hash, safe to hand to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&UserRecord> for User {
    fn from(r: &UserRecord) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            email: r.email.clone(),
            email_verified: r.email_verified,
            status: r.status,
            created_at: r.created_at,
            deleted_at: r.deleted_at,
        }
    }
}

/// What a user sees and edits on their profile page. `profile_pic` is a
/// `data:image/...;base64,` URL, empty when none was uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub bio: String,
    pub profile_pic: String,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Viviana,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub costs_credits: bool,
    #[serde(default)]
    pub is_admin_message: bool,
}

impl Message {
    /// Short human-readable preview: the text, or a media placeholder.
    pub fn preview(&self) -> String {
        match (&self.text, &self.media) {
            (Some(text), _) => text.clone(),
            (None, Some(media)) => match media.kind {
                MediaKind::Audio => "[voice message]".to_string(),
                MediaKind::Photo => "[photo]".to_string(),
            },
            (None, None) => String::new(),
        }
    }
}

/// Which active users receive an admin broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastAudience {
    #[default]
    All,
    /// Logged in within the last 7 days.
    RecentlyActive,
    /// Fewer than 10 credits left.
    LowCredits,
    /// More than 100 credits purchased in total.
    HighSpenders,
}

/// What a message carries: plain text or a reference to uploaded media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Media { media: MediaRef },
}

// -- Rank & jokers --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankLevel {
    pub level: u8,
    pub name: &'static str,
    pub emoji: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankInfo {
    pub progress: u64,
    pub level: u8,
    pub name: &'static str,
    pub emoji: &'static str,
    pub progress_in_level: u64,
    pub threshold_for_level: u64,
    pub percent_to_next: u8,
    pub next_level_name: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Joker {
    pub id: &'static str,
    pub title: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
    pub required_level: u8,
    pub cost: i64,
    pub special: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JokerCard {
    #[serde(flatten)]
    pub joker: Joker,
    pub unlocked: bool,
    pub used: bool,
    pub affordable: bool,
    pub usable: bool,
}

// -- Payments --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credits: i64,
    pub price_cents: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
}

// -- Reports --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub balance: i64,
    pub total_purchased: i64,
    pub total_consumed: i64,
    pub entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub stored_balance: i64,
    pub ledger_balance: i64,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserOverview {
    pub user: User,
    pub credits: LedgerSummary,
    pub last_login: Option<DateTime<Utc>>,
    pub rank: RankInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub last_message: String,
    pub message_count: usize,
    pub last_active: DateTime<Utc>,
    pub unread_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: usize,
    pub active_users: usize,
    pub total_credits: i64,
    pub credits_consumed: i64,
    pub revenue_cents: i64,
    pub revenue_this_month_cents: i64,
    pub total_messages: usize,
    pub messages_today: usize,
}

/// Formats a price in cents as `$4.49`.
pub fn format_price(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}
