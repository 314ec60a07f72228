//! Per-tier cache of the last successfully acquired position.
//!
//! One slot per accuracy tier, replaced wholesale on every fresh
//! acquisition. Slots are independent: a high-accuracy acquisition never
//! touches the low-accuracy slot or vice versa. Age is measured against the
//! simulated clock.

use crate::position::{AccuracyTier, MaximumAge, Position};

/// Snapshot cache with one slot per accuracy tier
#[derive(Debug, Default)]
pub(crate) struct PositionCache {
    slots: [Option<Position>; 2],
}

impl PositionCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the slot matching the position's tier
    pub(crate) fn insert(&mut self, position: Position) {
        let index = position.tier().index();
        self.slots[index] = Some(position);
    }

    /// Cached position for the tier, subject to the age policy.
    ///
    /// `MaximumAge::Zero` never hits. `Finite` hits when the entry's age is
    /// at most the limit; an age exactly equal to the limit counts as a hit.
    /// `Infinite` hits whenever a matching-tier entry exists, regardless of
    /// age. A clock rewound past the entry's timestamp yields age zero.
    pub(crate) fn lookup(
        &self,
        tier: AccuracyTier,
        maximum_age: MaximumAge,
        now_ms: u64,
    ) -> Option<Position> {
        let entry = self.slots[tier.index()].as_ref()?;
        match maximum_age {
            MaximumAge::Zero => None,
            MaximumAge::Finite(limit) => {
                let age_ms = now_ms.saturating_sub(entry.timestamp_ms);
                (age_ms as u128 <= limit.as_millis()).then(|| entry.clone())
            }
            MaximumAge::Infinite => Some(entry.clone()),
        }
    }
}
