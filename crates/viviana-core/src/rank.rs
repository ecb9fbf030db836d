//! Soulmate rank: a per-user message counter mapped onto five levels.
//!
//! Every message counts, in either direction. Thresholds are cumulative
//! message totals and widen sharply at the higher levels.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use viviana_db::Store;
use viviana_types::models::{RankInfo, RankLevel};

use crate::error::CoreResult;

/// Messages required to reach each level, indexed by `level - 1`.
pub const RANK_THRESHOLDS: [u64; 5] = [0, 15, 50, 150, 500];

pub const RANK_LEVELS: [RankLevel; 5] = [
    RankLevel { level: 1, name: "Curious", emoji: "🌱" },
    RankLevel { level: 2, name: "Connected", emoji: "💫" },
    RankLevel { level: 3, name: "Close", emoji: "🌸" },
    RankLevel { level: 4, name: "Intimate", emoji: "🔥" },
    RankLevel { level: 5, name: "Soulmates", emoji: "💕" },
];

pub const MAX_LEVEL: u8 = RANK_LEVELS.len() as u8;

/// 1-based level for a progress count.
pub fn level(progress: u64) -> u8 {
    RANK_THRESHOLDS
        .iter()
        .rposition(|&t| progress >= t)
        .map_or(1, |i| i as u8 + 1)
}

pub fn rank_level(level: u8) -> &'static RankLevel {
    let idx = usize::from(level.clamp(1, MAX_LEVEL)) - 1;
    &RANK_LEVELS[idx]
}

pub fn rank_info(progress: u64) -> RankInfo {
    let level = level(progress);
    let current = rank_level(level);

    if level >= MAX_LEVEL {
        return RankInfo {
            progress,
            level,
            name: current.name,
            emoji: current.emoji,
            progress_in_level: 0,
            threshold_for_level: 0,
            percent_to_next: 100,
            next_level_name: None,
        };
    }

    let floor = RANK_THRESHOLDS[usize::from(level) - 1];
    let ceil = RANK_THRESHOLDS[usize::from(level)];
    let progress_in_level = progress - floor;
    let threshold_for_level = ceil - floor;
    let percent = (progress_in_level as f64 * 100.0 / threshold_for_level as f64).round();

    RankInfo {
        progress,
        level,
        name: current.name,
        emoji: current.emoji,
        progress_in_level,
        threshold_for_level,
        percent_to_next: percent as u8,
        next_level_name: Some(rank_level(level + 1).name),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankIncrement {
    pub progress: u64,
    pub level_before: u8,
    pub level_after: u8,
    pub leveled_up: bool,
}

pub fn progress(store: &Store<'_>, user_id: Uuid) -> CoreResult<u64> {
    Ok(store.rank_progress(user_id)?)
}

/// Counts one message and reports whether a level boundary was crossed.
pub fn increment(store: &Store<'_>, user_id: Uuid) -> CoreResult<RankIncrement> {
    let before = store.bump_rank_progress(user_id)?;
    let after = before.saturating_add(1);

    let level_before = level(before);
    let level_after = level(after);
    let leveled_up = level_after > level_before;
    if leveled_up {
        info!("User {} reached {}", user_id, rank_level(level_after).name);
    }

    Ok(RankIncrement {
        progress: after,
        level_before,
        level_after,
        leveled_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use viviana_db::Database;

    #[test]
    fn levels_match_thresholds_at_boundaries() {
        assert_eq!(level(0), 1);
        assert_eq!(level(14), 1);
        assert_eq!(level(15), 2);
        assert_eq!(level(49), 2);
        assert_eq!(level(50), 3);
        assert_eq!(level(149), 3);
        assert_eq!(level(150), 4);
        assert_eq!(level(499), 4);
        assert_eq!(level(500), 5);
        assert_eq!(level(u64::MAX), 5);
    }

    #[test]
    fn level_is_monotonic() {
        let mut last = level(0);
        for p in 1..=600 {
            let l = level(p);
            assert!(l >= last, "level dropped at {p}");
            last = l;
        }
    }

    #[test]
    fn rank_info_percentages() {
        let info = rank_info(0);
        assert_eq!(info.name, "Curious");
        assert_eq!(info.percent_to_next, 0);
        assert_eq!(info.next_level_name, Some("Connected"));

        // 25 of the 35 messages between Connected (15) and Close (50)
        let info = rank_info(40);
        assert_eq!(info.level, 2);
        assert_eq!(info.progress_in_level, 25);
        assert_eq!(info.threshold_for_level, 35);
        assert_eq!(info.percent_to_next, 71);

        let info = rank_info(900);
        assert_eq!(info.name, "Soulmates");
        assert_eq!(info.percent_to_next, 100);
        assert_eq!(info.next_level_name, None);
    }

    #[test]
    fn increment_reports_level_up_once() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        db.transaction(|s| {
            s.write_json(&viviana_db::StorageKey::user(user, viviana_db::UserField::RankProgress), &13u64)?;
            Ok::<_, crate::CoreError>(())
        })
        .unwrap();

        let first = db.transaction(|s| increment(s, user)).unwrap();
        assert_eq!(first.progress, 14);
        assert!(!first.leveled_up);

        let second = db.transaction(|s| increment(s, user)).unwrap();
        assert_eq!(second.progress, 15);
        assert!(second.leveled_up);
        assert_eq!((second.level_before, second.level_after), (1, 2));

        let third = db.transaction(|s| increment(s, user)).unwrap();
        assert!(!third.leveled_up);
    }
}
