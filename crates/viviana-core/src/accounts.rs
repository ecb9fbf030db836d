use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use viviana_db::{StorageKey, Store, UserField};
use viviana_types::models::{User, UserProfile, UserRecord, UserStatus};

use crate::error::{CoreError, CoreResult};
use crate::{audit, ledger};

pub const MIN_PASSWORD_LEN: usize = 6;
/// Lifetime of email verification and password reset codes.
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 15;
pub const MAX_PROFILE_PIC_BYTES: usize = 5 * 1024 * 1024;
pub const DELETED_USER_NAME: &str = "Deleted User";

const PROFILE_PIC_TYPES: [&str; 4] = ["png", "jpeg", "jpg", "gif"];

/// Per-user data dropped when an account is soft-deleted.
const SOFT_DELETE_FIELDS: [UserField; 8] = [
    UserField::Credits,
    UserField::CreditsLedger,
    UserField::Bio,
    UserField::ProfilePic,
    UserField::Messages,
    UserField::LastLogin,
    UserField::VerificationCode,
    UserField::PasswordReset,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OneTimeCode {
    code: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Signup {
    pub user: UserRecord,
    pub verification_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub user_id: Uuid,
    pub removed_keys: usize,
    pub removed_payments: usize,
    pub removed_log_events: usize,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Creates an unverified account, grants the welcome credits and issues a
/// verification code.
pub fn signup(
    store: &Store<'_>,
    name: &str,
    email: &str,
    password: &str,
    initial_credits: i64,
) -> CoreResult<Signup> {
    let name = name.trim();
    let email = normalize_email(email);
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(CoreError::Validation("name, email and password are required".into()));
    }
    if !email.contains('@') {
        return Err(CoreError::Validation("invalid email address".into()));
    }
    check_password_strength(password)?;
    if store.find_user_by_email(&email)?.is_some() {
        return Err(CoreError::EmailTaken);
    }

    let now = Utc::now();
    let user = UserRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.clone(),
        password_hash: hash_password(password)?,
        email_verified: false,
        status: UserStatus::Active,
        created_at: now,
        deleted_at: None,
    };
    store.put_user(&user)?;

    store.set_profile_text(user.id, UserField::Bio, "")?;
    store.set_profile_text(user.id, UserField::ProfilePic, "")?;
    store.set_messages(user.id, &[])?;
    store.set_last_login(user.id, now)?;

    if initial_credits > 0 {
        ledger::initial_grant(store, user.id, initial_credits)?;
    } else {
        store.set_balance(user.id, 0)?;
    }

    let verification_code = issue_verification_code(store, user.id)?;
    audit::log_security_event(
        store,
        "signup_success",
        json!({ "email": email, "user_id": user.id.to_string() }),
    )?;

    info!("New user {} signed up", user.id);
    Ok(Signup { user, verification_code })
}

fn check_password_strength(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Stores a fresh 6-digit code under `field`, replacing any previous one.
fn issue_code(store: &Store<'_>, user_id: Uuid, field: UserField) -> CoreResult<String> {
    let code = rand::rng().random_range(100_000..1_000_000u32).to_string();
    let record = OneTimeCode {
        code: code.clone(),
        expires_at: Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES),
    };
    store.write_json(&StorageKey::user(user_id, field), &record)?;
    Ok(code)
}

/// Checks `code` against the one stored under `field` and consumes it.
fn redeem_code(
    store: &Store<'_>,
    user_id: Uuid,
    field: UserField,
    code: &str,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let key = StorageKey::user(user_id, field);
    let stored: OneTimeCode = store
        .read_json_opt(&key)?
        .ok_or(CoreError::InvalidVerificationCode)?;
    if now > stored.expires_at || stored.code != code.trim() {
        return Err(CoreError::InvalidVerificationCode);
    }
    store.remove(&key)?;
    Ok(())
}

/// Issues an email verification code. There is no mail transport; the code
/// is logged for delivery.
pub fn issue_verification_code(store: &Store<'_>, user_id: Uuid) -> CoreResult<String> {
    let code = issue_code(store, user_id, UserField::VerificationCode)?;
    info!(user_id = %user_id, code = %code, "verification code issued");
    Ok(code)
}

pub fn verify_email(
    store: &Store<'_>,
    email: &str,
    code: &str,
    now: DateTime<Utc>,
) -> CoreResult<UserRecord> {
    let mut user = store
        .find_user_by_email(&normalize_email(email))?
        .ok_or(CoreError::InvalidVerificationCode)?;
    redeem_code(store, user.id, UserField::VerificationCode, code, now)?;

    user.email_verified = true;
    store.put_user(&user)?;
    audit::log_security_event(store, "email_verified", json!({ "user_id": user.id.to_string() }))?;
    Ok(user)
}

/// Starts a password reset. Returns the code, or `None` when no account
/// uses `email`; callers must not reveal which.
pub fn request_password_reset(store: &Store<'_>, email: &str) -> CoreResult<Option<String>> {
    let email = normalize_email(email);
    let Some(user) = store.find_user_by_email(&email)? else {
        audit::log_security_event(
            store,
            "password_reset_attempted",
            json!({ "email": email, "found": false }),
        )?;
        return Ok(None);
    };

    let code = issue_code(store, user.id, UserField::PasswordReset)?;
    audit::log_security_event(store, "password_reset_requested", json!({ "email": email }))?;
    info!(user_id = %user.id, code = %code, "password reset code issued");
    Ok(Some(code))
}

/// Sets a new password once the reset code checks out. A wrong or expired
/// code leaves the stored code in place.
pub fn reset_password(
    store: &Store<'_>,
    email: &str,
    code: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> CoreResult<UserRecord> {
    let email = normalize_email(email);
    let mut user = store
        .find_user_by_email(&email)?
        .ok_or(CoreError::InvalidVerificationCode)?;
    redeem_code(store, user.id, UserField::PasswordReset, code, now)?;
    check_password_strength(new_password)?;

    user.password_hash = hash_password(new_password)?;
    store.put_user(&user)?;
    audit::log_security_event(
        store,
        "password_reset_success",
        json!({ "email": email, "user_id": user.id.to_string() }),
    )?;
    info!("Password reset for user {}", user.id);
    Ok(user)
}

/// Checks credentials. Wrong credentials are reported before a disabled
/// account, and a disabled account before a missing verification. Failures
/// are not logged here because the caller's transaction is rolled back.
pub fn login(store: &Store<'_>, email: &str, password: &str) -> CoreResult<UserRecord> {
    let user = store
        .find_user_by_email(&normalize_email(email))?
        .ok_or(CoreError::InvalidCredentials)?;

    if !verify_password(password, &user.password_hash) {
        return Err(CoreError::InvalidCredentials);
    }
    if user.status != UserStatus::Active {
        return Err(CoreError::AccountDisabled(user.status));
    }
    if !user.email_verified {
        return Err(CoreError::EmailNotVerified);
    }

    store.set_last_login(user.id, Utc::now())?;
    audit::log_security_event(
        store,
        "login_success",
        json!({ "email": user.email, "user_id": user.id.to_string() }),
    )?;
    Ok(user)
}

pub fn get(store: &Store<'_>, user_id: Uuid) -> CoreResult<UserRecord> {
    store.user(user_id)?.ok_or(CoreError::UserNotFound(user_id))
}

/// Like `get`, but blocked and deleted accounts are refused.
pub fn require_active(store: &Store<'_>, user_id: Uuid) -> CoreResult<UserRecord> {
    let user = get(store, user_id)?;
    if user.status != UserStatus::Active {
        return Err(CoreError::AccountDisabled(user.status));
    }
    Ok(user)
}

pub fn find_by_email(store: &Store<'_>, email: &str) -> CoreResult<Option<UserRecord>> {
    Ok(store.find_user_by_email(&normalize_email(email))?)
}

pub fn list(store: &Store<'_>) -> CoreResult<Vec<User>> {
    let mut users: Vec<User> = store.users()?.values().map(User::from).collect();
    users.sort_by_key(|u| u.created_at);
    Ok(users)
}

pub fn profile(store: &Store<'_>, user_id: Uuid) -> CoreResult<UserProfile> {
    let user = get(store, user_id)?;
    Ok(UserProfile {
        user: User::from(&user),
        bio: store.profile_text(user_id, UserField::Bio)?,
        profile_pic: store.profile_text(user_id, UserField::ProfilePic)?,
    })
}

pub fn update_profile(
    store: &Store<'_>,
    user_id: Uuid,
    name: &str,
    bio: &str,
) -> CoreResult<UserProfile> {
    let mut user = require_active(store, user_id)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("Name cannot be empty".into()));
    }

    user.name = name.to_string();
    store.put_user(&user)?;
    store.set_profile_text(user_id, UserField::Bio, bio.trim())?;
    profile(store, user_id)
}

/// Stores an uploaded picture given as a `data:image/<type>;base64,` URL.
pub fn set_profile_picture(store: &Store<'_>, user_id: Uuid, image: &str) -> CoreResult<UserProfile> {
    require_active(store, user_id)?;
    let image = image.trim();
    let (header, payload) = image
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(|| CoreError::Validation("profile picture must be a base64 image data URL".into()))?;
    if !PROFILE_PIC_TYPES.contains(&header) {
        return Err(CoreError::Validation(format!("unsupported image type: {}", header)));
    }

    let bytes = B64
        .decode(payload)
        .map_err(|_| CoreError::Validation("profile picture is not valid base64".into()))?;
    if bytes.is_empty() {
        return Err(CoreError::Validation("profile picture is empty".into()));
    }
    if bytes.len() > MAX_PROFILE_PIC_BYTES {
        return Err(CoreError::Validation("Image too large. Max 5MB allowed.".into()));
    }

    store.set_profile_text(user_id, UserField::ProfilePic, image)?;
    info!("User {} updated profile picture ({} bytes)", user_id, bytes.len());
    profile(store, user_id)
}

/// Admin override for users who never received their code.
pub fn mark_verified(store: &Store<'_>, user_id: Uuid) -> CoreResult<UserRecord> {
    let mut user = get(store, user_id)?;
    if user.status == UserStatus::Deleted {
        return Err(CoreError::AccountDisabled(user.status));
    }
    if !user.email_verified {
        user.email_verified = true;
        store.put_user(&user)?;
        store.remove(&StorageKey::user(user_id, UserField::VerificationCode))?;
        audit::log_security_event(
            store,
            "email_verified",
            json!({ "user_id": user_id.to_string(), "by_admin": true }),
        )?;
    }
    Ok(user)
}

/// Blocks or unblocks an account; `Deleted` soft-deletes it. Deleted
/// accounts cannot be brought back.
pub fn set_status(store: &Store<'_>, user_id: Uuid, status: UserStatus) -> CoreResult<UserRecord> {
    if status == UserStatus::Deleted {
        return soft_delete(store, user_id);
    }
    let mut user = get(store, user_id)?;
    if user.status == UserStatus::Deleted {
        return Err(CoreError::Validation("deleted accounts cannot be restored".into()));
    }

    user.status = status;
    store.put_user(&user)?;
    audit::log_security_event(
        store,
        "user_status_changed",
        json!({ "user_id": user_id.to_string(), "status": status.to_string() }),
    )?;
    info!("User {} status changed to {}", user_id, status);
    Ok(user)
}

/// Keeps a tombstone record and drops the account's personal data: the
/// name, email and password hash are replaced and the per-user keys removed.
/// The email becomes free for a new signup.
pub fn soft_delete(store: &Store<'_>, user_id: Uuid) -> CoreResult<UserRecord> {
    let mut user = get(store, user_id)?;
    if user.status == UserStatus::Deleted {
        return Ok(user);
    }

    audit::log_security_event(
        store,
        "account_deleted",
        json!({ "user_id": user_id.to_string(), "email": user.email }),
    )?;

    user.status = UserStatus::Deleted;
    user.deleted_at = Some(Utc::now());
    user.email = anonymized_email(user_id);
    user.name = DELETED_USER_NAME.to_string();
    user.password_hash = String::new();
    store.put_user(&user)?;

    for field in SOFT_DELETE_FIELDS {
        store.remove(&StorageKey::user(user_id, field))?;
    }

    info!("User {} deleted", user_id);
    Ok(user)
}

pub fn anonymized_email(user_id: Uuid) -> String {
    format!("deleted+{}@viviana.invalid", user_id)
}

/// Removes every trace of the account registered under `email`.
pub fn purge_by_email(store: &Store<'_>, email: &str) -> CoreResult<Option<PurgeReport>> {
    let Some(user) = store.find_user_by_email(&normalize_email(email))? else {
        return Ok(None);
    };
    purge(store, user.id).map(Some)
}

/// Removes the user record, every per-user key, the user's payments and the
/// security events that mention them. Works on soft-deleted accounts too.
pub fn purge(store: &Store<'_>, user_id: Uuid) -> CoreResult<PurgeReport> {
    let user = get(store, user_id)?;
    let id_str = user.id.to_string();

    store.remove_user(user.id)?;

    let mut removed_keys = 0;
    for key in store.user_keys(user.id)? {
        if store.remove_key(&key)? {
            removed_keys += 1;
        }
    }

    let mut removed_payments = 0;
    for payment in store.payments()?.into_iter().filter(|p| p.user_id == user.id) {
        if store.remove(&StorageKey::Payment(payment.id))? {
            removed_payments += 1;
        }
    }

    let removed_log_events =
        store.retain_security_events(|e| !e.mentions(&id_str) && !e.mentions(&user.email))?;

    info!(
        "Purged user {}: {} keys, {} payments, {} log events",
        user.id, removed_keys, removed_payments, removed_log_events
    );
    Ok(PurgeReport {
        user_id: user.id,
        removed_keys,
        removed_payments,
        removed_log_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use viviana_db::Database;

    fn signup_ok(db: &Database, email: &str) -> Signup {
        db.transaction(|s| signup(s, "Ana", email, "secret1", 3)).unwrap()
    }

    #[test]
    fn signup_grants_initial_credits_and_normalizes_email() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "  Ana@Example.COM ");
        assert_eq!(created.user.email, "ana@example.com");
        assert!(!created.user.email_verified);
        assert_eq!(created.verification_code.len(), 6);

        let (balance, entries) = db
            .read(|s| Ok::<_, CoreError>((ledger::balance(s, created.user.id)?, ledger::entries(s, created.user.id)?)))
            .unwrap();
        assert_eq!(balance, 3);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "Welcome bonus - New user signup");
    }

    #[test]
    fn signup_rejects_duplicates_and_short_passwords() {
        let db = Database::open_in_memory().unwrap();
        signup_ok(&db, "ana@example.com");

        let dup = db.transaction(|s| signup(s, "Other", "ANA@example.com", "secret1", 3));
        assert!(matches!(dup, Err(CoreError::EmailTaken)));

        let short = db.transaction(|s| signup(s, "Bo", "bo@example.com", "12345", 3));
        assert!(matches!(short, Err(CoreError::Validation(_))));
    }

    #[test]
    fn login_requires_verification_then_succeeds() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");

        let err = db.transaction(|s| login(s, "ana@example.com", "secret1")).unwrap_err();
        assert!(matches!(err, CoreError::EmailNotVerified));

        let err = db
            .transaction(|s| verify_email(s, "ana@example.com", "000000x", Utc::now()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidVerificationCode));

        db.transaction(|s| verify_email(s, "ana@example.com", &created.verification_code, Utc::now()))
            .unwrap();

        let bad = db.transaction(|s| login(s, "ana@example.com", "wrong-pass"));
        assert!(matches!(bad, Err(CoreError::InvalidCredentials)));

        let user = db.transaction(|s| login(s, "ana@example.com", "secret1")).unwrap();
        assert_eq!(user.id, created.user.id);
        assert!(db.read(|s| s.last_login(user.id)).unwrap().is_some());
    }

    #[test]
    fn expired_code_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        let later = Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES + 1);
        let err = db
            .transaction(|s| verify_email(s, "ana@example.com", &created.verification_code, later))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidVerificationCode));
    }

    #[test]
    fn blocked_user_cannot_log_in() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        db.transaction(|s| mark_verified(s, created.user.id)).unwrap();
        db.transaction(|s| set_status(s, created.user.id, UserStatus::Blocked)).unwrap();

        let err = db.transaction(|s| login(s, "ana@example.com", "secret1")).unwrap_err();
        assert!(matches!(err, CoreError::AccountDisabled(UserStatus::Blocked)));
    }

    #[test]
    fn login_reports_wrong_password_before_account_state() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        db.transaction(|s| set_status(s, created.user.id, UserStatus::Blocked)).unwrap();

        let err = db.transaction(|s| login(s, "ana@example.com", "wrong-pass")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
        // blocked wins over unverified
        let err = db.transaction(|s| login(s, "ana@example.com", "secret1")).unwrap_err();
        assert!(matches!(err, CoreError::AccountDisabled(UserStatus::Blocked)));
    }

    #[test]
    fn soft_delete_anonymizes_and_drops_personal_data() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        let id = created.user.id;
        db.transaction(|s| update_profile(s, id, "Ana", "hello")).unwrap();

        let deleted = db.transaction(|s| soft_delete(s, id)).unwrap();
        assert_eq!(deleted.status, UserStatus::Deleted);
        assert_eq!(deleted.email, anonymized_email(id));
        assert_eq!(deleted.name, DELETED_USER_NAME);
        assert!(deleted.password_hash.is_empty());
        assert!(deleted.deleted_at.is_some());

        let removed = db
            .read(|s| {
                let mut present = Vec::new();
                for field in SOFT_DELETE_FIELDS {
                    if s.contains(&StorageKey::user(id, field))? {
                        present.push(field);
                    }
                }
                Ok::<_, CoreError>(present)
            })
            .unwrap();
        assert!(removed.is_empty(), "left behind: {:?}", removed);
        assert!(db.read(|s| find_by_email(s, "ana@example.com")).unwrap().is_none());
        assert!(db.read(|s| get(s, id)).is_ok());

        let events = db.read(|s| s.security_log()).unwrap();
        let logged = events.iter().find(|e| e.event_type == "account_deleted").unwrap();
        assert_eq!(logged.details["email"], "ana@example.com");

        // the address is free again and the old password is gone
        let err = db.transaction(|s| login(s, &deleted.email, "secret1")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
        signup_ok(&db, "ana@example.com");
    }

    #[test]
    fn deleted_status_is_final() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        db.transaction(|s| set_status(s, created.user.id, UserStatus::Deleted)).unwrap();

        let err = db
            .transaction(|s| set_status(s, created.user.id, UserStatus::Active))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let again = db.transaction(|s| soft_delete(s, created.user.id)).unwrap();
        assert_eq!(again.status, UserStatus::Deleted);
    }

    #[test]
    fn purge_reaches_soft_deleted_accounts() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        let id = created.user.id;
        db.transaction(|s| soft_delete(s, id)).unwrap();

        // the original email no longer resolves, the id still does
        assert!(db.transaction(|s| purge_by_email(s, "ana@example.com")).unwrap().is_none());
        let report = db.transaction(|s| purge(s, id)).unwrap();
        assert_eq!(report.user_id, id);
        assert_eq!(report.removed_log_events, 2);

        assert!(db.read(|s| s.user_keys(id)).unwrap().is_empty());
        assert!(matches!(db.read(|s| get(s, id)), Err(CoreError::UserNotFound(_))));
    }

    #[test]
    fn profile_update_trims_and_requires_a_name() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        let id = created.user.id;

        let err = db.transaction(|s| update_profile(s, id, "   ", "bio")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let updated = db.transaction(|s| update_profile(s, id, "  Ana Maria ", "  likes tea  ")).unwrap();
        assert_eq!(updated.user.name, "Ana Maria");
        assert_eq!(updated.bio, "likes tea");
        assert_eq!(db.read(|s| profile(s, id)).unwrap(), updated);
    }

    #[test]
    fn profile_picture_checks_type_and_size() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        let id = created.user.id;

        let png = format!("data:image/png;base64,{}", B64.encode([137u8, 80, 78, 71]));
        let saved = db.transaction(|s| set_profile_picture(s, id, &png)).unwrap();
        assert_eq!(saved.profile_pic, png);

        let svg = format!("data:image/svg+xml;base64,{}", B64.encode(b"<svg/>"));
        assert!(matches!(
            db.transaction(|s| set_profile_picture(s, id, &svg)),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            db.transaction(|s| set_profile_picture(s, id, "data:image/gif;base64,***")),
            Err(CoreError::Validation(_))
        ));

        let huge = format!(
            "data:image/jpeg;base64,{}",
            B64.encode(vec![0u8; MAX_PROFILE_PIC_BYTES + 1])
        );
        assert!(matches!(
            db.transaction(|s| set_profile_picture(s, id, &huge)),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(db.read(|s| profile(s, id)).unwrap().profile_pic, png);
    }

    #[test]
    fn password_reset_replaces_the_password() {
        let db = Database::open_in_memory().unwrap();
        let created = signup_ok(&db, "ana@example.com");
        db.transaction(|s| mark_verified(s, created.user.id)).unwrap();

        assert!(db.transaction(|s| request_password_reset(s, "nobody@example.com")).unwrap().is_none());
        let code = db
            .transaction(|s| request_password_reset(s, "ANA@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(code.len(), 6);

        let wrong = db.transaction(|s| reset_password(s, "ana@example.com", "abcdef", "newpass1", Utc::now()));
        assert!(matches!(wrong, Err(CoreError::InvalidVerificationCode)));
        let short = db.transaction(|s| reset_password(s, "ana@example.com", &code, "123", Utc::now()));
        assert!(matches!(short, Err(CoreError::Validation(_))));
        let later = Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES + 1);
        let expired = db.transaction(|s| reset_password(s, "ana@example.com", &code, "newpass1", later));
        assert!(matches!(expired, Err(CoreError::InvalidVerificationCode)));

        db.transaction(|s| reset_password(s, "ana@example.com", &code, "newpass1", Utc::now()))
            .unwrap();
        assert!(db.transaction(|s| login(s, "ana@example.com", "secret1")).is_err());
        db.transaction(|s| login(s, "ana@example.com", "newpass1")).unwrap();

        // one use only
        let reused = db.transaction(|s| reset_password(s, "ana@example.com", &code, "newpass2", Utc::now()));
        assert!(matches!(reused, Err(CoreError::InvalidVerificationCode)));

        let kinds: Vec<_> = db
            .read(|s| s.security_log())
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert!(kinds.contains(&"password_reset_attempted".to_string()));
        assert!(kinds.contains(&"password_reset_requested".to_string()));
        assert!(kinds.contains(&"password_reset_success".to_string()));
    }

    #[test]
    fn purge_removes_every_user_key() {
        let db = Database::open_in_memory().unwrap();
        let keep = signup_ok(&db, "keep@example.com");
        let gone = signup_ok(&db, "gone@example.com");

        let report = db
            .transaction(|s| purge_by_email(s, "gone@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(report.user_id, gone.user.id);
        assert!(report.removed_keys >= 5);
        assert_eq!(report.removed_log_events, 1);

        let (left, keep_keys) = db
            .read(|s| Ok::<_, CoreError>((s.user_keys(gone.user.id)?, s.user_keys(keep.user.id)?)))
            .unwrap();
        assert!(left.is_empty());
        assert!(!keep_keys.is_empty());

        assert!(db.transaction(|s| purge_by_email(s, "gone@example.com")).unwrap().is_none());
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }
}
