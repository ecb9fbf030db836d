use thiserror::Error;
use uuid::Uuid;

use viviana_types::models::PaymentStatus;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("Payment {id} is {status}, expected {expected}")]
    InvalidPaymentState {
        id: Uuid,
        status: PaymentStatus,
        expected: PaymentStatus,
    },

    #[error("Credit package not found: {0}")]
    PackageNotFound(usize),

    #[error("Joker not found: {0}")]
    JokerNotFound(String),

    #[error("Joker requires level {required}, current level is {current}")]
    JokerLocked { required: u8, current: u8 },

    #[error("Account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address is not verified")]
    EmailNotVerified,

    #[error("Invalid or expired verification code")]
    InvalidVerificationCode,

    #[error("Account is {0}")]
    AccountDisabled(viviana_types::models::UserStatus),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
