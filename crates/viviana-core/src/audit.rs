use serde_json::Value;
use tracing::info;

use viviana_db::{StorageKey, Store};
use viviana_types::events::{SecurityEvent, WebhookEvent, WebhookEventType};
use viviana_types::models::Payment;

use crate::error::CoreResult;

pub const SECURITY_LOG_CAP: usize = 1000;
pub const WEBHOOK_LOG_CAP: usize = 100;

pub fn log_security_event(store: &Store<'_>, event_type: &str, details: Value) -> CoreResult<()> {
    info!(event = event_type, %details, "security event");
    store.push_capped(
        &StorageKey::SecurityLog,
        SecurityEvent::new(event_type, details),
        SECURITY_LOG_CAP,
    )?;
    Ok(())
}

pub fn record_webhook(
    store: &Store<'_>,
    event_type: WebhookEventType,
    payment: &Payment,
) -> CoreResult<WebhookEvent> {
    let event = WebhookEvent::new(event_type, payment.clone());
    store.push_capped(&StorageKey::WebhookLog, event.clone(), WEBHOOK_LOG_CAP)?;
    Ok(event)
}

pub fn security_log(store: &Store<'_>) -> CoreResult<Vec<SecurityEvent>> {
    Ok(store.security_log()?)
}

pub fn webhook_log(store: &Store<'_>) -> CoreResult<Vec<WebhookEvent>> {
    Ok(store.webhook_log()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use viviana_db::Database;

    #[test]
    fn security_log_keeps_last_thousand_events() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|s| {
            for i in 0..(SECURITY_LOG_CAP + 5) {
                log_security_event(s, "login_success", json!({ "n": i }))?;
            }
            Ok::<_, crate::CoreError>(())
        })
        .unwrap();

        let log = db.read(|s| security_log(s)).unwrap();
        assert_eq!(log.len(), SECURITY_LOG_CAP);
        assert_eq!(log[0].details["n"], 5);
    }
}
