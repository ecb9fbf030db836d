//! Simulated payment processor.
//!
//! A payment is created `pending` and then either completes (crediting the
//! user) or fails. Only succeeded payments can be refunded. Each transition
//! is mirrored to the webhook log the way a hosted processor would notify us.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use viviana_db::Store;
use viviana_types::events::WebhookEventType;
use viviana_types::models::{CreditPackage, LedgerEntry, Payment, PaymentStatus, format_price};

use crate::error::{CoreError, CoreResult};
use crate::{accounts, audit, ledger};

pub fn packages(store: &Store<'_>) -> CoreResult<Vec<CreditPackage>> {
    Ok(store.credit_packages()?.unwrap_or_else(CreditPackage::defaults))
}

fn packages_for_update(store: &Store<'_>) -> CoreResult<Vec<CreditPackage>> {
    Ok(store
        .credit_packages_for_update()?
        .unwrap_or_else(CreditPackage::defaults))
}

pub fn add_package(store: &Store<'_>, package: CreditPackage) -> CoreResult<Vec<CreditPackage>> {
    if package.name.trim().is_empty() {
        return Err(CoreError::Validation("package name is required".into()));
    }
    if package.credits <= 0 {
        return Err(CoreError::InvalidAmount(package.credits));
    }
    if package.price_cents < 0 {
        return Err(CoreError::Validation("price cannot be negative".into()));
    }

    let mut all = packages_for_update(store)?;
    all.push(package);
    store.set_credit_packages(&all)?;
    Ok(all)
}

pub fn remove_package(store: &Store<'_>, index: usize) -> CoreResult<CreditPackage> {
    let mut all = packages_for_update(store)?;
    if index >= all.len() {
        return Err(CoreError::PackageNotFound(index));
    }
    let removed = all.remove(index);
    store.set_credit_packages(&all)?;
    Ok(removed)
}

fn load(store: &Store<'_>, id: Uuid) -> CoreResult<Payment> {
    store.payment(id)?.ok_or(CoreError::PaymentNotFound(id))
}

fn expect_status(payment: &Payment, expected: PaymentStatus) -> CoreResult<()> {
    if payment.status != expected {
        return Err(CoreError::InvalidPaymentState {
            id: payment.id,
            status: payment.status,
            expected,
        });
    }
    Ok(())
}

pub fn initiate(
    store: &Store<'_>,
    user_id: Uuid,
    credits: i64,
    price_cents: i64,
) -> CoreResult<Payment> {
    accounts::require_active(store, user_id)?;
    if credits <= 0 {
        return Err(CoreError::InvalidAmount(credits));
    }
    if price_cents < 0 {
        return Err(CoreError::Validation("price cannot be negative".into()));
    }

    let payment = Payment {
        id: Uuid::new_v4(),
        user_id,
        credits,
        price_cents,
        status: PaymentStatus::Pending,
        created_at: Utc::now(),
        completed_at: None,
        failed_at: None,
        failure_reason: None,
        refunded_at: None,
        refund_reason: None,
    };
    store.put_payment(&payment)?;
    audit::log_security_event(
        store,
        "payment_initiated",
        json!({
            "payment_id": payment.id.to_string(),
            "user_id": user_id.to_string(),
            "credits": credits,
            "price_cents": price_cents,
        }),
    )?;
    Ok(payment)
}

/// Marks a pending payment succeeded and credits the user.
pub fn complete(store: &Store<'_>, id: Uuid) -> CoreResult<(Payment, LedgerEntry)> {
    let mut payment = load(store, id)?;
    expect_status(&payment, PaymentStatus::Pending)?;

    let entry = ledger::purchase(store, payment.user_id, payment.credits, payment.price_cents, id)?;

    payment.status = PaymentStatus::Succeeded;
    payment.completed_at = Some(Utc::now());
    store.put_payment(&payment)?;
    audit::record_webhook(store, WebhookEventType::PaymentSucceeded, &payment)?;
    audit::log_security_event(
        store,
        "payment_succeeded",
        json!({
            "payment_id": id.to_string(),
            "user_id": payment.user_id.to_string(),
            "credits": payment.credits,
        }),
    )?;

    info!(
        "Payment {} succeeded: {} credits for {}",
        id,
        payment.credits,
        format_price(payment.price_cents)
    );
    Ok((payment, entry))
}

pub fn fail(store: &Store<'_>, id: Uuid, reason: &str) -> CoreResult<Payment> {
    let mut payment = load(store, id)?;
    expect_status(&payment, PaymentStatus::Pending)?;

    payment.status = PaymentStatus::Failed;
    payment.failed_at = Some(Utc::now());
    payment.failure_reason = Some(reason.to_string());
    store.put_payment(&payment)?;
    audit::record_webhook(store, WebhookEventType::PaymentFailed, &payment)?;
    audit::log_security_event(
        store,
        "payment_failed",
        json!({
            "payment_id": id.to_string(),
            "user_id": payment.user_id.to_string(),
            "reason": reason,
        }),
    )?;

    warn!("Payment {} failed: {}", id, reason);
    Ok(payment)
}

/// Refunds a succeeded payment. The refunded credits are added back to the
/// user's balance as a `refund` ledger entry.
pub fn refund(store: &Store<'_>, id: Uuid, reason: &str) -> CoreResult<(Payment, LedgerEntry)> {
    let mut payment = load(store, id)?;
    expect_status(&payment, PaymentStatus::Succeeded)?;

    let reason = if reason.trim().is_empty() {
        "Payment refunded"
    } else {
        reason.trim()
    };
    let entry = ledger::refund(store, payment.user_id, payment.credits, reason, id)?;

    payment.status = PaymentStatus::Refunded;
    payment.refunded_at = Some(Utc::now());
    payment.refund_reason = Some(reason.to_string());
    store.put_payment(&payment)?;
    audit::record_webhook(store, WebhookEventType::PaymentRefunded, &payment)?;
    audit::log_security_event(
        store,
        "payment_refunded",
        json!({
            "payment_id": id.to_string(),
            "user_id": payment.user_id.to_string(),
            "credits": payment.credits,
            "reason": reason,
        }),
    )?;

    info!("Payment {} refunded", id);
    Ok((payment, entry))
}

/// Buys the package at `index`, completing the payment immediately.
pub fn purchase_package(
    store: &Store<'_>,
    user_id: Uuid,
    index: usize,
) -> CoreResult<(Payment, LedgerEntry)> {
    let package = packages(store)?
        .into_iter()
        .nth(index)
        .ok_or(CoreError::PackageNotFound(index))?;
    let payment = initiate(store, user_id, package.credits, package.price_cents)?;
    complete(store, payment.id)
}

/// All payments, oldest first, optionally restricted to one user.
pub fn list(store: &Store<'_>, user_id: Option<Uuid>) -> CoreResult<Vec<Payment>> {
    let mut all = store.payments()?;
    if let Some(user_id) = user_id {
        all.retain(|p| p.user_id == user_id);
    }
    Ok(all)
}
