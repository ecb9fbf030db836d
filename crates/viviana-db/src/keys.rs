use std::fmt;

use uuid::Uuid;

pub const KEY_PREFIX: &str = "VIVIANA_";
pub const PAYMENT_PREFIX: &str = "VIVIANA_PAYMENT_";

/// Per-user fields, rendered as `VIVIANA_<userId>_<FIELD>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Credits,
    CreditsLedger,
    Messages,
    RankProgress,
    JokerUsed,
    Bio,
    ProfilePic,
    LastLogin,
    VerificationCode,
    PasswordReset,
}

impl UserField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credits => "CREDITS",
            Self::CreditsLedger => "CREDITS_LEDGER",
            Self::Messages => "MESSAGES",
            Self::RankProgress => "RANK_PROGRESS",
            Self::JokerUsed => "JOKER_USED",
            Self::Bio => "BIO",
            Self::ProfilePic => "PROFILE_PIC",
            Self::LastLogin => "LAST_LOGIN",
            Self::VerificationCode => "VERIFICATION_CODE",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }
}

/// Every key the application reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    Users,
    User { user_id: Uuid, field: UserField },
    Payment(Uuid),
    SecurityLog,
    WebhookLog,
    CreditPackages,
}

impl StorageKey {
    pub fn user(user_id: Uuid, field: UserField) -> Self {
        Self::User { user_id, field }
    }

    /// Prefix shared by every per-user key of `user_id`.
    pub fn user_prefix(user_id: Uuid) -> String {
        format!("{KEY_PREFIX}{user_id}_")
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Users => write!(f, "{KEY_PREFIX}USERS"),
            Self::User { user_id, field } => write!(f, "{KEY_PREFIX}{user_id}_{}", field.as_str()),
            Self::Payment(id) => write!(f, "{PAYMENT_PREFIX}{id}"),
            Self::SecurityLog => write!(f, "{KEY_PREFIX}SECURITY_LOG"),
            Self::WebhookLog => write!(f, "{KEY_PREFIX}WEBHOOK_LOG"),
            Self::CreditPackages => write!(f, "{KEY_PREFIX}CREDIT_PACKAGES"),
        }
    }
}

/// Extracts the user id from a per-user key such as `VIVIANA_<uuid>_CREDITS`.
/// Global keys and payment keys return `None`.
pub fn parse_user_scoped(key: &str) -> Option<Uuid> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    let (id, tail) = rest.split_at_checked(36)?;
    if !tail.starts_with('_') {
        return None;
    }
    Uuid::parse_str(id).ok()
}
