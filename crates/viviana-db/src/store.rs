//! Typed repository over the key-value table.
//!
//! Read-only views decode JSON into the model type: a missing key yields the
//! type's empty value, and a malformed value is logged and treated the same
//! way. Read-modify-write paths go through `update_json`, which refuses to
//! rewrite a value it cannot decode.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use viviana_types::events::{SecurityEvent, WebhookEvent};
use viviana_types::models::{CreditPackage, LedgerEntry, Message, Payment, UserRecord};

use crate::keys::{PAYMENT_PREFIX, StorageKey, UserField};
use crate::queries::{kv_get, kv_keys_with_prefix, kv_remove, kv_rows_with_prefix, kv_set};

pub struct Store<'c> {
    conn: &'c Connection,
}

impl<'c> Store<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // -- Raw --

    pub fn get_raw(&self, key: &StorageKey) -> Result<Option<String>> {
        kv_get(self.conn, &key.to_string())
    }

    pub fn set_raw(&self, key: &StorageKey, value: &str) -> Result<()> {
        kv_set(self.conn, &key.to_string(), value)
    }

    pub fn remove(&self, key: &StorageKey) -> Result<bool> {
        kv_remove(self.conn, &key.to_string())
    }

    pub fn remove_key(&self, key: &str) -> Result<bool> {
        kv_remove(self.conn, key)
    }

    pub fn contains(&self, key: &StorageKey) -> Result<bool> {
        Ok(self.get_raw(key)?.is_some())
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        kv_keys_with_prefix(self.conn, prefix)
    }

    // -- JSON --

    /// Decodes the value at `key`; `None` when missing or malformed.
    pub fn read_json_opt<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!("Malformed value at {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub fn read_json<T: DeserializeOwned + Default>(&self, key: &StorageKey) -> Result<T> {
        Ok(self.read_json_opt(key)?.unwrap_or_default())
    }

    /// Strict decode: `None` when missing, an error when malformed.
    pub fn load_json<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).with_context(|| format!("malformed value at {}", key))?;
        Ok(Some(value))
    }

    /// Applies `f` to the decoded value at `key` (or its default when
    /// missing) and writes the result back. A malformed stored value is left
    /// untouched and reported as an error.
    pub fn update_json<T, R>(&self, key: &StorageKey, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut value: T = self.load_json(key)?.unwrap_or_default();
        let out = f(&mut value);
        self.write_json(key, &value)?;
        Ok(out)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, key: &StorageKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }

    /// Appends to a JSON array, dropping the oldest items beyond `cap`.
    pub fn push_capped<T>(&self, key: &StorageKey, item: T, cap: usize) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.update_json(key, |items: &mut Vec<T>| {
            items.push(item);
            if items.len() > cap {
                let excess = items.len() - cap;
                items.drain(..excess);
            }
        })
    }

    // -- Users --

    pub fn users(&self) -> Result<BTreeMap<Uuid, UserRecord>> {
        self.read_json(&StorageKey::Users)
    }

    pub fn user(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users()?.remove(&user_id))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users()?.into_values().find(|u| u.email == email))
    }

    pub fn put_user(&self, record: &UserRecord) -> Result<()> {
        self.update_json(&StorageKey::Users, |users: &mut BTreeMap<Uuid, UserRecord>| {
            users.insert(record.id, record.clone());
        })
    }

    pub fn remove_user(&self, user_id: Uuid) -> Result<bool> {
        self.update_json(&StorageKey::Users, |users: &mut BTreeMap<Uuid, UserRecord>| {
            users.remove(&user_id).is_some()
        })
    }

    /// Every stored key belonging to `user_id`.
    pub fn user_keys(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.keys_with_prefix(&StorageKey::user_prefix(user_id))
    }

    pub fn last_login(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        self.read_json_opt(&StorageKey::user(user_id, UserField::LastLogin))
    }

    pub fn set_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.write_json(&StorageKey::user(user_id, UserField::LastLogin), &at)
    }

    pub fn profile_text(&self, user_id: Uuid, field: UserField) -> Result<String> {
        self.read_json(&StorageKey::user(user_id, field))
    }

    pub fn set_profile_text(&self, user_id: Uuid, field: UserField, value: &str) -> Result<()> {
        self.write_json(&StorageKey::user(user_id, field), value)
    }

    // -- Credits --

    /// Stored balance, `None` when the key has never been written.
    pub fn balance(&self, user_id: Uuid) -> Result<Option<i64>> {
        self.read_json_opt(&StorageKey::user(user_id, UserField::Credits))
    }

    /// Stored balance for a write path; a malformed value is an error.
    pub fn balance_for_update(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .load_json(&StorageKey::user(user_id, UserField::Credits))?
            .unwrap_or(0))
    }

    pub fn set_balance(&self, user_id: Uuid, balance: i64) -> Result<()> {
        self.write_json(&StorageKey::user(user_id, UserField::Credits), &balance)
    }

    pub fn ledger(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.read_json(&StorageKey::user(user_id, UserField::CreditsLedger))
    }

    pub fn append_ledger_entry(&self, user_id: Uuid, entry: &LedgerEntry) -> Result<()> {
        let key = StorageKey::user(user_id, UserField::CreditsLedger);
        self.update_json(&key, |ledger: &mut Vec<LedgerEntry>| ledger.push(entry.clone()))
    }

    pub fn credit_packages(&self) -> Result<Option<Vec<CreditPackage>>> {
        self.read_json_opt(&StorageKey::CreditPackages)
    }

    /// Stored package list for a write path; a malformed list is an error.
    pub fn credit_packages_for_update(&self) -> Result<Option<Vec<CreditPackage>>> {
        self.load_json(&StorageKey::CreditPackages)
    }

    pub fn set_credit_packages(&self, packages: &[CreditPackage]) -> Result<()> {
        self.write_json(&StorageKey::CreditPackages, packages)
    }

    // -- Messages --

    pub fn messages(&self, user_id: Uuid) -> Result<Vec<Message>> {
        self.read_json(&StorageKey::user(user_id, UserField::Messages))
    }

    pub fn set_messages(&self, user_id: Uuid, messages: &[Message]) -> Result<()> {
        self.write_json(&StorageKey::user(user_id, UserField::Messages), messages)
    }

    pub fn update_messages<R>(&self, user_id: Uuid, f: impl FnOnce(&mut Vec<Message>) -> R) -> Result<R> {
        self.update_json(&StorageKey::user(user_id, UserField::Messages), f)
    }

    pub fn append_message(&self, user_id: Uuid, message: &Message) -> Result<()> {
        self.update_messages(user_id, |messages| messages.push(message.clone()))
    }

    // -- Rank & jokers --

    pub fn rank_progress(&self, user_id: Uuid) -> Result<u64> {
        self.read_json(&StorageKey::user(user_id, UserField::RankProgress))
    }

    /// Adds one to the rank counter. Returns the value before the bump.
    pub fn bump_rank_progress(&self, user_id: Uuid) -> Result<u64> {
        self.update_json(&StorageKey::user(user_id, UserField::RankProgress), |p: &mut u64| {
            let before = *p;
            *p = p.saturating_add(1);
            before
        })
    }

    pub fn jokers_used(&self, user_id: Uuid) -> Result<BTreeMap<String, bool>> {
        self.read_json(&StorageKey::user(user_id, UserField::JokerUsed))
    }

    pub fn set_jokers_used(&self, user_id: Uuid, used: &BTreeMap<String, bool>) -> Result<()> {
        self.write_json(&StorageKey::user(user_id, UserField::JokerUsed), used)
    }

    pub fn mark_joker_used(&self, user_id: Uuid, joker_id: &str) -> Result<()> {
        self.update_json(
            &StorageKey::user(user_id, UserField::JokerUsed),
            |used: &mut BTreeMap<String, bool>| {
                used.insert(joker_id.to_string(), true);
            },
        )
    }

    // -- Payments --

    pub fn payment(&self, id: Uuid) -> Result<Option<Payment>> {
        self.read_json_opt(&StorageKey::Payment(id))
    }

    pub fn put_payment(&self, payment: &Payment) -> Result<()> {
        self.write_json(&StorageKey::Payment(payment.id), payment)
    }

    /// All decodable payments, oldest first.
    pub fn payments(&self) -> Result<Vec<Payment>> {
        let rows = kv_rows_with_prefix(self.conn, PAYMENT_PREFIX)?;
        let mut payments: Vec<Payment> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_str(&row.value) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Skipping malformed payment at {}: {}", row.key, e);
                    None
                }
            })
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    // -- Audit logs --

    pub fn security_log(&self) -> Result<Vec<SecurityEvent>> {
        self.read_json(&StorageKey::SecurityLog)
    }

    /// Keeps only the events matching `keep`. Returns how many were dropped.
    pub fn retain_security_events(&self, keep: impl Fn(&SecurityEvent) -> bool) -> Result<usize> {
        self.update_json(&StorageKey::SecurityLog, |events: &mut Vec<SecurityEvent>| {
            let before = events.len();
            events.retain(|e| keep(e));
            before - events.len()
        })
    }

    pub fn webhook_log(&self) -> Result<Vec<WebhookEvent>> {
        self.read_json(&StorageKey::WebhookLog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use viviana_types::models::UserStatus;

    fn record(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: email.into(),
            password_hash: "x".into(),
            email_verified: false,
            status: UserStatus::Active,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn malformed_json_falls_back_to_default() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        db.transaction(|store| {
            store.set_raw(&StorageKey::user(id, UserField::Messages), "{not json")?;
            store.set_raw(&StorageKey::user(id, UserField::Credits), "abc")
        })
        .unwrap();

        db.read(|store| {
            assert!(store.messages(id)?.is_empty());
            assert_eq!(store.balance(id)?, None);
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }

    #[test]
    fn users_round_trip_through_the_users_map() {
        let db = Database::open_in_memory().unwrap();
        let u = record("ana@example.com");
        db.transaction(|store| store.put_user(&u)).unwrap();

        let found = db
            .read(|store| store.find_user_by_email("ana@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, u.id);

        assert!(db.transaction(|store| store.remove_user(u.id)).unwrap());
        assert!(db.read(|store| store.user(u.id)).unwrap().is_none());
    }

    #[test]
    fn push_capped_keeps_newest_items() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|store| {
            for i in 0..5 {
                store.push_capped(&StorageKey::SecurityLog, i, 3)?;
            }
            let kept: Vec<i32> = store.read_json(&StorageKey::SecurityLog)?;
            assert_eq!(kept, vec![2, 3, 4]);
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }

    #[test]
    fn updates_refuse_to_overwrite_malformed_values() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let key = StorageKey::user(id, UserField::CreditsLedger);
        let corrupt = r#"[{"amount":"3"}]"#;
        db.transaction(|store| store.set_raw(&key, corrupt)).unwrap();

        let res: Result<()> = db.transaction(|store| {
            store.update_json(&key, |entries: &mut Vec<serde_json::Value>| entries.clear())?;
            store.push_capped(&key, 1, 10)
        });
        assert!(res.is_err());
        // views still fall back, the stored text is untouched
        assert_eq!(db.read(|store| store.get_raw(&key)).unwrap().as_deref(), Some(corrupt));

        let users_key = StorageKey::Users;
        db.transaction(|store| store.set_raw(&users_key, "not a map")).unwrap();
        let res = db.transaction(|store| store.put_user(&record("ana@example.com")));
        assert!(res.is_err());
        assert!(db.read(|store| store.users()).unwrap().is_empty());
        assert_eq!(
            db.read(|store| store.get_raw(&users_key)).unwrap().as_deref(),
            Some("not a map")
        );
    }

    #[test]
    fn bump_rank_progress_counts_from_zero() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let before = db
            .transaction(|store| {
                store.bump_rank_progress(id)?;
                store.bump_rank_progress(id)
            })
            .unwrap();
        assert_eq!(before, 1);
        assert_eq!(db.read(|store| store.rank_progress(id)).unwrap(), 2);
    }

    #[test]
    fn user_keys_are_scoped_by_prefix() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.transaction(|store| {
            store.set_balance(a, 3)?;
            store.write_json(&StorageKey::user(a, UserField::RankProgress), &1u64)?;
            store.set_balance(b, 7)
        })
        .unwrap();

        let keys = db.read(|store| store.user_keys(a)).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.contains(&a.to_string())));
    }
}
