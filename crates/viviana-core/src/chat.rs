//! Conversation between a user and Viviana.
//!
//! Messages live in one JSON array per user. User messages cost credits;
//! companion replies and admin replies are free. Every message, in either
//! direction, advances the soulmate rank.

use std::cmp::Reverse;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use viviana_db::Store;
use viviana_types::models::{
    BroadcastAudience, ConversationSummary, LedgerEntry, Message, MessageContent, SenderType,
    UserStatus,
};

use crate::error::{CoreError, CoreResult};
use crate::rank::{self, RankIncrement};
use crate::{accounts, ledger};

pub const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentMessage {
    pub message: Message,
    /// Present when the message was charged.
    pub entry: Option<LedgerEntry>,
    pub rank: RankIncrement,
    /// Balance once the message is stored.
    pub balance: i64,
}

fn build_message(sender_type: SenderType, content: MessageContent) -> CoreResult<Message> {
    let (text, media) = match content {
        MessageContent::Text { text } => {
            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(CoreError::EmptyMessage);
            }
            (Some(text), None)
        }
        MessageContent::Media { media } => {
            if media.url.trim().is_empty() {
                return Err(CoreError::EmptyMessage);
            }
            (None, Some(media))
        }
    };

    Ok(Message {
        id: Uuid::new_v4(),
        sender_type,
        text,
        media,
        timestamp: Utc::now(),
        read: false,
        costs_credits: false,
        is_admin_message: false,
    })
}

/// Charges `cost` credits, then appends the message. Nothing is written if
/// the balance is too low.
pub fn send_user_message(
    store: &Store<'_>,
    user_id: Uuid,
    content: MessageContent,
    cost: i64,
) -> CoreResult<SentMessage> {
    accounts::require_active(store, user_id)?;
    let mut message = build_message(SenderType::User, content)?;

    let entry = if cost > 0 {
        message.costs_credits = true;
        Some(ledger::spend(
            store,
            user_id,
            cost,
            "Sent message to Viviana",
            json!({ "message_id": message.id }),
        )?)
    } else {
        None
    };

    store.append_message(user_id, &message)?;
    let rank = rank::increment(store, user_id)?;
    let balance = match &entry {
        Some(entry) => entry.balance_after,
        None => ledger::balance(store, user_id)?,
    };

    debug!("User {} sent message {}", user_id, message.id);
    Ok(SentMessage { message, entry, rank, balance })
}

/// A reply from Viviana herself, delivered through the admin console.
pub fn receive_companion_message(
    store: &Store<'_>,
    user_id: Uuid,
    content: MessageContent,
) -> CoreResult<SentMessage> {
    accounts::get(store, user_id)?;
    let message = build_message(SenderType::Viviana, content)?;
    deliver(store, user_id, message)
}

/// Text reply typed by an admin. Shown to the user as coming from Viviana.
pub fn send_admin_reply(store: &Store<'_>, user_id: Uuid, text: &str) -> CoreResult<SentMessage> {
    accounts::get(store, user_id)?;
    let mut message = build_message(
        SenderType::Viviana,
        MessageContent::Text { text: text.to_string() },
    )?;
    message.is_admin_message = true;
    message.read = true;
    deliver(store, user_id, message)
}

fn deliver(store: &Store<'_>, user_id: Uuid, message: Message) -> CoreResult<SentMessage> {
    store.append_message(user_id, &message)?;
    let rank = rank::increment(store, user_id)?;
    Ok(SentMessage {
        message,
        entry: None,
        rank,
        balance: ledger::balance(store, user_id)?,
    })
}

pub fn history(store: &Store<'_>, user_id: Uuid) -> CoreResult<Vec<Message>> {
    Ok(store.messages(user_id)?)
}

/// Messages stored after the one with id `after`. With no cursor, or a
/// cursor that is no longer present, the full history is returned.
pub fn messages_after(
    store: &Store<'_>,
    user_id: Uuid,
    after: Option<Uuid>,
) -> CoreResult<Vec<Message>> {
    let messages = store.messages(user_id)?;
    let Some(after) = after else {
        return Ok(messages);
    };
    match messages.iter().position(|m| m.id == after) {
        Some(idx) => Ok(messages[idx + 1..].to_vec()),
        None => Ok(messages),
    }
}

/// Marks every unread user message as read. Returns how many changed.
pub fn mark_user_messages_read(store: &Store<'_>, user_id: Uuid) -> CoreResult<usize> {
    let changed = store.update_messages(user_id, |messages| {
        let mut changed = 0;
        for msg in messages
            .iter_mut()
            .filter(|m| m.sender_type == SenderType::User && !m.read)
        {
            msg.read = true;
            changed += 1;
        }
        changed
    })?;
    Ok(changed)
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// One summary per non-deleted user, unread conversations first, then most
/// recently active. Users without messages sort by signup time.
pub fn conversations(store: &Store<'_>) -> CoreResult<Vec<ConversationSummary>> {
    let mut out = Vec::new();
    for user in store.users()?.into_values() {
        if user.status == UserStatus::Deleted {
            continue;
        }
        let messages = store.messages(user.id)?;
        let unread_count = messages
            .iter()
            .filter(|m| m.sender_type == SenderType::User && !m.read)
            .count();
        let (last_message, last_active) = match messages.last() {
            Some(last) => (truncate_preview(&last.preview()), last.timestamp),
            None => (String::new(), user.created_at),
        };
        out.push(ConversationSummary {
            user_id: user.id,
            name: user.name,
            email: user.email,
            last_message,
            message_count: messages.len(),
            last_active,
            unread_count,
        });
    }
    out.sort_by_key(|c| (c.unread_count == 0, Reverse(c.last_active)));
    Ok(out)
}

fn in_audience(
    store: &Store<'_>,
    user_id: Uuid,
    audience: BroadcastAudience,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    Ok(match audience {
        BroadcastAudience::All => true,
        BroadcastAudience::RecentlyActive => store
            .last_login(user_id)?
            .is_some_and(|at| now - at <= Duration::days(7)),
        BroadcastAudience::LowCredits => ledger::balance(store, user_id)? < 10,
        BroadcastAudience::HighSpenders => ledger::summary(store, user_id)?.total_purchased > 100,
    })
}

/// Sends the same admin message to every active user in `audience`.
/// Returns the number of recipients.
pub fn broadcast(
    store: &Store<'_>,
    text: &str,
    audience: BroadcastAudience,
    now: DateTime<Utc>,
) -> CoreResult<usize> {
    if text.trim().is_empty() {
        return Err(CoreError::EmptyMessage);
    }

    let mut delivered = 0;
    for user in store.users()?.into_values() {
        if user.status != UserStatus::Active {
            continue;
        }
        if !in_audience(store, user.id, audience, now)? {
            continue;
        }
        send_admin_reply(store, user.id, text)?;
        delivered += 1;
    }

    info!("Broadcast to {:?} delivered to {} users", audience, delivered);
    Ok(delivered)
}
