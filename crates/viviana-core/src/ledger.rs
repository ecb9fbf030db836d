//! Credits ledger.
//!
//! The ledger is the audit history of a user's credits: every balance change
//! appends one entry and rewrites the stored balance in the same transaction.
//! The stored balance is a cache of the sum of all entry amounts; `reconcile`
//! checks that the two agree.

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use viviana_db::Store;
use viviana_types::models::{
    LedgerEntry, LedgerEventType, LedgerSummary, Reconciliation, format_price,
};

use crate::audit;
use crate::error::{CoreError, CoreResult};

pub fn balance(store: &Store<'_>, user_id: Uuid) -> CoreResult<i64> {
    Ok(store.balance(user_id)?.unwrap_or(0))
}

pub fn entries(store: &Store<'_>, user_id: Uuid) -> CoreResult<Vec<LedgerEntry>> {
    Ok(store.ledger(user_id)?)
}

/// Debits `amount` credits. Fails without writing anything when the balance
/// would go negative.
pub fn spend(
    store: &Store<'_>,
    user_id: Uuid,
    amount: i64,
    reason: &str,
    metadata: Value,
) -> CoreResult<LedgerEntry> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    let current = store.balance_for_update(user_id)?;
    if current < amount {
        warn!("User {} cannot spend {} credits (balance {})", user_id, amount, current);
        return Err(CoreError::InsufficientBalance {
            balance: current,
            requested: amount,
        });
    }
    append(store, user_id, LedgerEventType::Spend, -amount, reason, metadata)
}

pub fn purchase(
    store: &Store<'_>,
    user_id: Uuid,
    credits: i64,
    price_cents: i64,
    payment_id: Uuid,
) -> CoreResult<LedgerEntry> {
    if credits <= 0 {
        return Err(CoreError::InvalidAmount(credits));
    }
    append(
        store,
        user_id,
        LedgerEventType::Purchase,
        credits,
        &format!("Purchased {} credits for {}", credits, format_price(price_cents)),
        json!({ "payment_id": payment_id, "price_cents": price_cents }),
    )
}

/// Signed manual correction by an admin. Also written to the security log.
pub fn admin_adjust(
    store: &Store<'_>,
    user_id: Uuid,
    amount: i64,
    reason: &str,
    admin_id: &str,
) -> CoreResult<LedgerEntry> {
    if amount == 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    if reason.trim().is_empty() {
        return Err(CoreError::Validation("a reason is required for credit adjustments".into()));
    }
    let entry = append(
        store,
        user_id,
        LedgerEventType::AdminAdjust,
        amount,
        reason.trim(),
        json!({ "admin_id": admin_id }),
    )?;
    audit::log_security_event(
        store,
        "credits_adjusted",
        json!({
            "user_id": user_id.to_string(),
            "amount": amount,
            "reason": reason.trim(),
            "admin_id": admin_id,
        }),
    )?;
    Ok(entry)
}

pub fn refund(
    store: &Store<'_>,
    user_id: Uuid,
    amount: i64,
    reason: &str,
    original_txn_id: Uuid,
) -> CoreResult<LedgerEntry> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    append(
        store,
        user_id,
        LedgerEventType::Refund,
        amount,
        reason,
        json!({ "original_txn_id": original_txn_id }),
    )
}

pub fn initial_grant(store: &Store<'_>, user_id: Uuid, amount: i64) -> CoreResult<LedgerEntry> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    append(
        store,
        user_id,
        LedgerEventType::InitialGrant,
        amount,
        "Welcome bonus - New user signup",
        json!({ "signup_date": Utc::now() }),
    )
}

pub fn summary(store: &Store<'_>, user_id: Uuid) -> CoreResult<LedgerSummary> {
    let entries = store.ledger(user_id)?;
    let total_purchased = entries
        .iter()
        .filter(|e| matches!(e.event_type, LedgerEventType::Purchase | LedgerEventType::InitialGrant))
        .map(|e| e.amount)
        .sum();
    let total_consumed = entries
        .iter()
        .filter(|e| e.event_type == LedgerEventType::Spend)
        .map(|e| e.amount)
        .sum::<i64>()
        .abs();

    Ok(LedgerSummary {
        balance: balance(store, user_id)?,
        total_purchased,
        total_consumed,
        entry_count: entries.len(),
    })
}

/// Consistent when the stored balance equals the sum of entry amounts and
/// every entry's before/after pair matches its amount.
pub fn reconcile(store: &Store<'_>, user_id: Uuid) -> CoreResult<Reconciliation> {
    let entries = store.ledger(user_id)?;
    let stored_balance = balance(store, user_id)?;
    let ledger_balance = entries.iter().map(|e| e.amount).sum();
    Ok(Reconciliation {
        stored_balance,
        ledger_balance,
        consistent: stored_balance == ledger_balance && entries.iter().all(LedgerEntry::is_balanced),
    })
}

fn append(
    store: &Store<'_>,
    user_id: Uuid,
    event_type: LedgerEventType,
    amount: i64,
    description: &str,
    metadata: Value,
) -> CoreResult<LedgerEntry> {
    let balance_before = store.balance_for_update(user_id)?;
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        event_type,
        amount,
        balance_before,
        balance_after: balance_before + amount,
        description: description.to_string(),
        metadata: into_map(metadata),
    };

    store.append_ledger_entry(user_id, &entry)?;
    store.set_balance(user_id, entry.balance_after)?;

    debug!(
        "Ledger {} for {}: {:+} ({} -> {})",
        event_type, user_id, amount, entry.balance_before, entry.balance_after
    );
    Ok(entry)
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viviana_db::Database;

    fn with_store<T>(db: &Database, f: impl FnOnce(&Store<'_>) -> CoreResult<T>) -> CoreResult<T> {
        db.transaction(f)
    }

    #[test]
    fn spend_one_from_three_leaves_two() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        with_store(&db, |s| {
            s.set_balance(user, 3)?;
            Ok(())
        })
        .unwrap();

        let entry = with_store(&db, |s| spend(s, user, 1, "msg", Value::Null)).unwrap();
        assert_eq!(entry.amount, -1);
        assert_eq!(entry.balance_before, 3);
        assert_eq!(entry.balance_after, 2);

        let (bal, ledger) = with_store(&db, |s| Ok((balance(s, user)?, entries(s, user)?))).unwrap();
        assert_eq!(bal, 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].amount, -1);
    }

    #[test]
    fn spend_never_drives_balance_negative() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        with_store(&db, |s| initial_grant(s, user, 2)).unwrap();

        let err = with_store(&db, |s| spend(s, user, 3, "too much", Value::Null)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientBalance { balance: 2, requested: 3 }
        ));

        with_store(&db, |s| spend(s, user, 2, "all of it", Value::Null)).unwrap();
        let err = with_store(&db, |s| spend(s, user, 1, "empty", Value::Null)).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { balance: 0, .. }));

        let ledger = with_store(&db, |s| entries(s, user)).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn malformed_ledger_blocks_spending_instead_of_being_replaced() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let key = viviana_db::StorageKey::user(user, viviana_db::UserField::CreditsLedger);
        let corrupt = r#"[{"amount":"3"}]"#;
        with_store(&db, |s| {
            s.set_balance(user, 3)?;
            s.set_raw(&key, corrupt)?;
            Ok(())
        })
        .unwrap();

        let err = with_store(&db, |s| spend(s, user, 1, "msg", Value::Null)).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));

        let (raw, bal) = db
            .read(|s| Ok::<_, CoreError>((s.get_raw(&key)?, balance(s, user)?)))
            .unwrap();
        assert_eq!(raw.as_deref(), Some(corrupt));
        assert_eq!(bal, 3);
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        assert!(matches!(
            with_store(&db, |s| spend(s, user, 0, "x", Value::Null)),
            Err(CoreError::InvalidAmount(0))
        ));
        assert!(matches!(
            with_store(&db, |s| refund(s, user, -5, "x", Uuid::new_v4())),
            Err(CoreError::InvalidAmount(-5))
        ));
        assert!(matches!(
            with_store(&db, |s| admin_adjust(s, user, 0, "x", "admin")),
            Err(CoreError::InvalidAmount(0))
        ));
    }

    #[test]
    fn balance_equals_sum_of_entries_across_operations() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();

        with_store(&db, |s| {
            initial_grant(s, user, 3)?;
            purchase(s, user, 50, 449, Uuid::new_v4())?;
            spend(s, user, 1, "message", json!({ "message_id": "m1" }))?;
            admin_adjust(s, user, -10, "chargeback", "admin")?;
            refund(s, user, 5, "goodwill", Uuid::new_v4())?;
            let _ = spend(s, user, 1_000, "rejected", Value::Null);
            spend(s, user, 7, "joker", Value::Null)?;
            Ok(())
        })
        .unwrap();

        let (ledger, rec) = with_store(&db, |s| Ok((entries(s, user)?, reconcile(s, user)?))).unwrap();
        assert_eq!(ledger.len(), 6);
        assert!(ledger.iter().all(LedgerEntry::is_balanced));
        for pair in ledger.windows(2) {
            assert_eq!(pair[0].balance_after, pair[1].balance_before);
        }
        assert!(rec.consistent);
        assert_eq!(rec.stored_balance, 3 + 50 - 1 - 10 + 5 - 7);
    }

    #[test]
    fn admin_adjust_requires_reason_and_is_audited() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();

        let err = with_store(&db, |s| admin_adjust(s, user, 5, "  ", "admin")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let entry = with_store(&db, |s| admin_adjust(s, user, 5, "support ticket", "admin")).unwrap();
        assert_eq!(entry.event_type, LedgerEventType::AdminAdjust);
        assert_eq!(entry.metadata["admin_id"], "admin");

        let log = db.read(|s| s.security_log()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event_type, "credits_adjusted");
    }

    #[test]
    fn summary_splits_purchases_and_consumption() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let summary = with_store(&db, |s| {
            initial_grant(s, user, 3)?;
            purchase(s, user, 10, 99, Uuid::new_v4())?;
            spend(s, user, 2, "a", Value::Null)?;
            spend(s, user, 1, "b", Value::Null)?;
            summary(s, user)
        })
        .unwrap();

        assert_eq!(summary.total_purchased, 13);
        assert_eq!(summary.total_consumed, 3);
        assert_eq!(summary.balance, 10);
        assert_eq!(summary.entry_count, 4);
    }

    #[test]
    fn reconcile_detects_a_balance_written_outside_the_ledger() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let rec = with_store(&db, |s| {
            initial_grant(s, user, 3)?;
            s.set_balance(user, 99)?;
            reconcile(s, user)
        })
        .unwrap();
        assert!(!rec.consistent);
        assert_eq!(rec.ledger_balance, 3);
    }

    #[test]
    fn reconcile_flags_an_entry_with_a_wrong_balance_after() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let rec = with_store(&db, |s| {
            let mut entry = initial_grant(s, user, 3)?;
            entry.balance_after = 4;
            s.write_json(
                &viviana_db::StorageKey::user(user, viviana_db::UserField::CreditsLedger),
                &[entry],
            )?;
            reconcile(s, user)
        })
        .unwrap();
        assert_eq!(rec.ledger_balance, rec.stored_balance);
        assert!(!rec.consistent);
    }

    #[test]
    fn purchase_description_includes_price() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let entry = with_store(&db, |s| purchase(s, user, 50, 449, Uuid::nil())).unwrap();
        assert_eq!(entry.description, "Purchased 50 credits for $4.49");
        assert_eq!(entry.metadata["price_cents"], 449);
    }
}
