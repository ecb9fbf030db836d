use serde_json::json;
use tracing::info;
use uuid::Uuid;

use viviana_db::Store;
use viviana_types::models::{Joker, JokerCard, LedgerEntry};

use crate::error::{CoreError, CoreResult};
use crate::{ledger, rank};

pub const JOKERS: [Joker; 6] = [
    Joker {
        id: "truth",
        title: "Truth Joker",
        emoji: "🔮",
        description: "Pose an honest, deep question — and receive a truthful answer.",
        required_level: 1,
        cost: 2,
        special: false,
    },
    Joker {
        id: "dare",
        title: "Dare Joker",
        emoji: "⚡",
        description: "Challenge each other with a lighthearted dare.",
        required_level: 2,
        cost: 2,
        special: false,
    },
    Joker {
        id: "memory",
        title: "Memory Joker",
        emoji: "📖",
        description: "Share a personal memory that shaped who you are today.",
        required_level: 2,
        cost: 3,
        special: false,
    },
    Joker {
        id: "emotion",
        title: "Emotion Joker",
        emoji: "💎",
        description: "Talk about something that truly moves you — no filters.",
        required_level: 3,
        cost: 3,
        special: false,
    },
    Joker {
        id: "photo_request",
        title: "Photo Request",
        emoji: "📸",
        description: "Send a casual selfie — casual, fun, just for each other.",
        required_level: 3,
        cost: 5,
        special: false,
    },
    Joker {
        id: "intimate_photo",
        title: "Intimate Photo",
        emoji: "✨",
        description: "A rare, special exchange — only for true Soulmates.",
        required_level: 5,
        cost: 10,
        special: true,
    },
];

pub fn catalog() -> &'static [Joker] {
    &JOKERS
}

pub fn find(id: &str) -> Option<&'static Joker> {
    JOKERS.iter().find(|j| j.id == id)
}

#[derive(Debug, Clone, PartialEq)]
pub enum JokerOutcome {
    Activated { joker: Joker, entry: LedgerEntry },
    /// The joker was used before; nothing was charged.
    AlreadyUsed { joker: Joker },
}

/// The catalog as seen by one user.
pub fn cards(store: &Store<'_>, user_id: Uuid) -> CoreResult<Vec<JokerCard>> {
    let level = rank::level(store.rank_progress(user_id)?);
    let used = store.jokers_used(user_id)?;
    let balance = ledger::balance(store, user_id)?;

    Ok(JOKERS
        .iter()
        .map(|joker| {
            let unlocked = level >= joker.required_level;
            let was_used = used.get(joker.id).copied().unwrap_or(false);
            let affordable = balance >= joker.cost;
            JokerCard {
                joker: *joker,
                unlocked,
                used: was_used,
                affordable,
                usable: unlocked && !was_used && affordable,
            }
        })
        .collect())
}

pub fn use_joker(store: &Store<'_>, user_id: Uuid, joker_id: &str) -> CoreResult<JokerOutcome> {
    let joker = *find(joker_id).ok_or_else(|| CoreError::JokerNotFound(joker_id.to_string()))?;

    let current = rank::level(store.rank_progress(user_id)?);
    if current < joker.required_level {
        return Err(CoreError::JokerLocked {
            required: joker.required_level,
            current,
        });
    }

    let used = store.jokers_used(user_id)?;
    if used.get(joker.id).copied().unwrap_or(false) {
        return Ok(JokerOutcome::AlreadyUsed { joker });
    }

    let entry = ledger::spend(
        store,
        user_id,
        joker.cost,
        &format!("Used Joker: {}", joker.title),
        json!({ "joker_id": joker.id }),
    )?;

    store.mark_joker_used(user_id, joker.id)?;

    info!("User {} activated {}", user_id, joker.title);
    Ok(JokerOutcome::Activated { joker, entry })
}

/// Makes every joker usable again for `user_id`.
pub fn reset(store: &Store<'_>, user_id: Uuid) -> CoreResult<()> {
    store.set_jokers_used(user_id, &Default::default())?;
    Ok(())
}
