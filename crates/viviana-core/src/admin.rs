//! Admin console operations: credentials, user overviews, dashboard
//! statistics and storage maintenance.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use viviana_db::keys::{KEY_PREFIX, parse_user_scoped};
use viviana_db::{StorageKey, Store, UserField};
use viviana_types::models::{
    DashboardStats, LedgerEventType, User, UserOverview, UserStatus,
};

use crate::accounts::{hash_password, verify_password};
use crate::error::{CoreError, CoreResult};
use crate::{audit, ledger, rank};

/// The single configured admin account. The password is kept only as an
/// argon2 hash.
#[derive(Clone)]
pub struct AdminAuth {
    username: String,
    password_hash: String,
}

impl AdminAuth {
    pub fn new(username: &str, password: &str) -> CoreResult<Self> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(CoreError::Validation("admin credentials must not be empty".into()));
        }
        Ok(Self {
            username: username.trim().to_string(),
            password_hash: hash_password(password)?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        // always hash, so a wrong username costs the same as a wrong password
        let password_ok = verify_password(password, &self.password_hash);
        password_ok && username.trim() == self.username
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub fn user_overview(store: &Store<'_>, user_id: Uuid) -> CoreResult<UserOverview> {
    let record = store.user(user_id)?.ok_or(CoreError::UserNotFound(user_id))?;
    Ok(UserOverview {
        user: User::from(&record),
        credits: ledger::summary(store, user_id)?,
        last_login: store.last_login(user_id)?,
        rank: rank::rank_info(store.rank_progress(user_id)?),
    })
}

/// Every non-deleted user, newest first.
pub fn user_overviews(store: &Store<'_>) -> CoreResult<Vec<UserOverview>> {
    let mut out = Vec::new();
    for record in store.users()?.into_values() {
        if record.status == UserStatus::Deleted {
            continue;
        }
        out.push(user_overview(store, record.id)?);
    }
    out.sort_by(|a, b| b.user.created_at.cmp(&a.user.created_at));
    Ok(out)
}

fn month_start(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn entry_price_cents(metadata: &serde_json::Map<String, Value>) -> i64 {
    metadata.get("price_cents").and_then(Value::as_i64).unwrap_or(0)
}

/// Aggregates across all non-deleted users. Revenue is taken from purchase
/// ledger entries; refunds do not reduce it.
pub fn dashboard_stats(store: &Store<'_>, now: DateTime<Utc>) -> CoreResult<DashboardStats> {
    let month_start = month_start(now);
    let day_ago = now - Duration::hours(24);
    let mut stats = DashboardStats::default();

    for user in store.users()?.into_values() {
        if user.status == UserStatus::Deleted {
            continue;
        }
        stats.total_users += 1;
        if user.status == UserStatus::Active {
            stats.active_users += 1;
        }

        stats.total_credits += ledger::balance(store, user.id)?;
        for entry in store.ledger(user.id)? {
            match entry.event_type {
                LedgerEventType::Spend => stats.credits_consumed += entry.amount.abs(),
                LedgerEventType::Purchase => {
                    let price = entry_price_cents(&entry.metadata);
                    stats.revenue_cents += price;
                    if month_start.is_some_and(|start| entry.timestamp >= start) {
                        stats.revenue_this_month_cents += price;
                    }
                }
                _ => {}
            }
        }

        let messages = store.messages(user.id)?;
        stats.total_messages += messages.len();
        stats.messages_today += messages.iter().filter(|m| m.timestamp >= day_ago).count();
    }

    Ok(stats)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub users_checked: usize,
    pub missing_credits: Vec<Uuid>,
    pub missing_messages: Vec<Uuid>,
    pub missing_ledgers: Vec<Uuid>,
    pub repaired_messages: usize,
    /// Message arrays that are not valid JSON. They are left untouched.
    pub unreadable_messages: Vec<Uuid>,
    pub inconsistent_balances: Vec<Uuid>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_credits.is_empty()
            && self.missing_messages.is_empty()
            && self.missing_ledgers.is_empty()
            && self.repaired_messages == 0
            && self.unreadable_messages.is_empty()
            && self.inconsistent_balances.is_empty()
    }
}

/// Fills in fields that older message records lack. Returns true if the
/// object was changed.
fn repair_message(value: &mut Value, now: DateTime<Utc>) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    let mut changed = false;

    if !map.get("id").and_then(Value::as_str).is_some_and(|s| Uuid::parse_str(s).is_ok()) {
        map.insert("id".into(), json!(Uuid::new_v4()));
        changed = true;
    }
    if !map.contains_key("sender_type") {
        // legacy records used "type": "sent" | "received"
        let sender = match map.get("type").and_then(Value::as_str) {
            Some("sent") => "user",
            _ => "viviana",
        };
        map.insert("sender_type".into(), json!(sender));
        changed = true;
    }
    if !map.contains_key("timestamp") {
        map.insert("timestamp".into(), json!(now));
        changed = true;
    }
    if !map.contains_key("read") {
        map.insert("read".into(), json!(true));
        changed = true;
    }
    changed
}

/// Creates missing per-user records and backfills legacy message fields for
/// every non-deleted user. Balances that disagree with the ledger and message
/// arrays that do not parse are reported, not rewritten.
pub fn check_data_consistency(store: &Store<'_>) -> CoreResult<ConsistencyReport> {
    let now = Utc::now();
    let mut report = ConsistencyReport::default();

    for user in store.users()?.into_values() {
        if user.status == UserStatus::Deleted {
            continue;
        }
        report.users_checked += 1;

        let credits_key = StorageKey::user(user.id, UserField::Credits);
        if !store.contains(&credits_key)? {
            store.set_balance(user.id, 0)?;
            report.missing_credits.push(user.id);
        }

        let ledger_key = StorageKey::user(user.id, UserField::CreditsLedger);
        if !store.contains(&ledger_key)? {
            store.write_json(&ledger_key, &[] as &[Value])?;
            report.missing_ledgers.push(user.id);
        }

        let key = StorageKey::user(user.id, UserField::Messages);
        match store.get_raw(&key)? {
            None => {
                store.set_messages(user.id, &[])?;
                report.missing_messages.push(user.id);
            }
            Some(raw) => match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(mut messages) => {
                    let repaired = messages.iter_mut().map(|m| repair_message(m, now)).filter(|r| *r).count();
                    if repaired > 0 {
                        store.write_json(&key, &messages)?;
                        report.repaired_messages += repaired;
                    }
                }
                Err(e) => {
                    warn!("Messages of user {} are unreadable: {}", user.id, e);
                    report.unreadable_messages.push(user.id);
                }
            },
        }

        if !ledger::reconcile(store, user.id)?.consistent {
            warn!("Balance of user {} disagrees with its ledger", user.id);
            report.inconsistent_balances.push(user.id);
        }
    }

    if !report.is_clean() {
        audit::log_security_event(
            store,
            "data_consistency_fixed",
            json!({
                "missing_credits": report.missing_credits.len(),
                "missing_messages": report.missing_messages.len(),
                "missing_ledgers": report.missing_ledgers.len(),
                "repaired_messages": report.repaired_messages,
                "unreadable_messages": report.unreadable_messages.len(),
                "inconsistent_balances": report.inconsistent_balances.len(),
            }),
        )?;
    }
    Ok(report)
}

/// Deletes per-user keys whose user no longer exists. Returns the removed
/// keys.
pub fn cleanup_orphaned_data(store: &Store<'_>) -> CoreResult<Vec<String>> {
    let users = store.users()?;
    let mut removed = Vec::new();

    for key in store.keys_with_prefix(KEY_PREFIX)? {
        let Some(owner) = parse_user_scoped(&key) else {
            continue;
        };
        if users.contains_key(&owner) {
            continue;
        }
        if store.remove_key(&key)? {
            removed.push(key);
        }
    }

    if !removed.is_empty() {
        info!("Removed {} orphaned keys", removed.len());
        audit::log_security_event(
            store,
            "orphaned_data_cleaned",
            json!({ "removed_keys": removed.len() }),
        )?;
    }
    Ok(removed)
}
