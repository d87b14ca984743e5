// 🍖 Care Actions - fixed deltas on the bounded stat triple
//
// Care is a pure function (stats, action) -> stats. The store applies the
// same delta atomically in SQL (see db::Database::apply_stat_delta), so the
// two must clamp identically.

use crate::pet::{Stats, STAT_MAX, STAT_MIN};
use serde::{Deserialize, Serialize};

/// Any stat below this means the pet needs attention
pub const CARE_THRESHOLD: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CareAction {
    Feed,
    Play,
    Rest,
}

impl CareAction {
    pub const ALL: [CareAction; 3] = [CareAction::Feed, CareAction::Play, CareAction::Rest];

    pub fn as_str(&self) -> &'static str {
        match self {
            CareAction::Feed => "feed",
            CareAction::Play => "play",
            CareAction::Rest => "rest",
        }
    }

    /// None for unrecognized tags; callers treat those as a no-op
    pub fn parse(tag: &str) -> Option<CareAction> {
        CareAction::ALL.iter().copied().find(|a| a.as_str() == tag)
    }

    pub fn delta(&self) -> StatDelta {
        match self {
            CareAction::Feed => StatDelta {
                hunger: 30,
                happiness: 0,
                energy: 10,
            },
            CareAction::Play => StatDelta {
                hunger: 0,
                happiness: 30,
                energy: -20,
            },
            CareAction::Rest => StatDelta {
                hunger: -10,
                happiness: 0,
                energy: 40,
            },
        }
    }
}

/// Signed change to each stat, clamped on application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatDelta {
    pub hunger: i32,
    pub happiness: i32,
    pub energy: i32,
}

impl StatDelta {
    pub fn is_zero(&self) -> bool {
        self.hunger == 0 && self.happiness == 0 && self.energy == 0
    }
}

fn clamp_add(value: u8, delta: i32) -> u8 {
    (value as i32 + delta).clamp(STAT_MIN as i32, STAT_MAX as i32) as u8
}

impl Stats {
    pub fn apply(&self, delta: StatDelta) -> Stats {
        Stats {
            hunger: clamp_add(self.hunger, delta.hunger),
            happiness: clamp_add(self.happiness, delta.happiness),
            energy: clamp_add(self.energy, delta.energy),
        }
    }

    pub fn needs_care(&self) -> bool {
        self.hunger < CARE_THRESHOLD
            || self.happiness < CARE_THRESHOLD
            || self.energy < CARE_THRESHOLD
    }
}

/// Apply a care action by tag. Unknown tags leave the stats unchanged.
pub fn apply_care(stats: Stats, tag: &str) -> Stats {
    match CareAction::parse(tag) {
        Some(action) => stats.apply(action.delta()),
        None => stats,
    }
}
