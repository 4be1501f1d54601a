//! Per-spot occupancy state machine.
//!
//! Each spot is either EMPTY or OCCUPIED. A single reading that differs from
//! the current state flips it and stamps `last_change_time`; a reading that
//! agrees leaves the timestamp alone so dwell time keeps accumulating.

use std::time::{Duration, SystemTime};

use crate::registry::Spot;

/// A flip observed by [`OccupancyTracker::apply_reading`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub slot_id: u32,
    pub occupied: bool,
    pub at: SystemTime,
}

/// Applies occupancy readings to spots and counts transitions for a session.
#[derive(Debug, Default)]
pub struct OccupancyTracker {
    readings: u64,
    transitions: u64,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one classification result to `spot`.
    ///
    /// Always marks the spot online. Returns the transition when the reading
    /// differs from the spot's current state.
    pub fn apply_reading(
        &mut self,
        spot: &mut Spot,
        observed_occupied: bool,
        now: SystemTime,
    ) -> Option<Transition> {
        self.readings += 1;
        spot.is_online = true;
        if spot.is_occupied == observed_occupied {
            return None;
        }

        spot.is_occupied = observed_occupied;
        spot.last_change_time = Some(now);
        self.transitions += 1;

        log::info!(
            "slot {} is now {}",
            spot.slot_id(),
            occupancy_label(observed_occupied)
        );
        Some(Transition {
            slot_id: spot.slot_id(),
            occupied: observed_occupied,
            at: now,
        })
    }

    pub fn readings(&self) -> u64 {
        self.readings
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}

pub fn occupancy_label(occupied: bool) -> &'static str {
    if occupied {
        "taken"
    } else {
        "empty"
    }
}

/// How long the spot has held its current state, if it has ever changed.
pub fn dwell(spot: &Spot, now: SystemTime) -> Option<Duration> {
    spot.last_change_time()
        .map(|changed| now.duration_since(changed).unwrap_or_default())
}

/// Human readable dwell, e.g. "occupied for 2 hours 5 minutes".
pub fn describe_dwell(spot: &Spot, now: SystemTime) -> String {
    let state = if spot.is_occupied() {
        "occupied"
    } else {
        "empty"
    };
    match dwell(spot, now) {
        Some(elapsed) => {
            let minutes = elapsed.as_secs() / 60;
            format!(
                "{} for {} hours {} minutes",
                state,
                minutes / 60,
                minutes % 60
            )
        }
        None => format!("{} (no change observed)", state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Rect, SpotRegistry};

    fn single_spot() -> SpotRegistry {
        let mut registry = SpotRegistry::new();
        registry.create(Rect::new(0, 0, 10, 10)).unwrap();
        registry
    }

    #[test]
    fn first_reading_marks_spot_online() {
        let mut registry = single_spot();
        let mut tracker = OccupancyTracker::new();
        let spot = registry.get_mut(0).unwrap();

        assert!(tracker.apply_reading(spot, false, SystemTime::now()).is_none());
        assert!(spot.is_online());
        assert!(spot.last_change_time().is_none());

        tracker.apply_reading(spot, true, SystemTime::now());
        tracker.apply_reading(spot, false, SystemTime::now());
        assert!(spot.is_online());
    }

    #[test]
    fn change_time_moves_only_on_flip() {
        let mut registry = single_spot();
        let mut tracker = OccupancyTracker::new();
        let spot = registry.get_mut(0).unwrap();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let t1 = t0 + Duration::from_secs(30);
        let t2 = t1 + Duration::from_secs(30);

        let flip = tracker.apply_reading(spot, true, t0).unwrap();
        assert_eq!(flip.slot_id, 1);
        assert!(flip.occupied);
        assert_eq!(spot.last_change_time(), Some(t0));

        assert!(tracker.apply_reading(spot, true, t1).is_none());
        assert_eq!(spot.last_change_time(), Some(t0));

        tracker.apply_reading(spot, false, t2).unwrap();
        assert_eq!(spot.last_change_time(), Some(t2));
        assert!(!spot.is_occupied());

        assert_eq!(tracker.readings(), 3);
        assert_eq!(tracker.transitions(), 2);
    }

    #[test]
    fn describe_dwell_reports_hours_and_minutes() {
        let mut registry = single_spot();
        let mut tracker = OccupancyTracker::new();
        let spot = registry.get_mut(0).unwrap();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);

        assert_eq!(describe_dwell(spot, t0), "empty (no change observed)");

        tracker.apply_reading(spot, true, t0);
        let later = t0 + Duration::from_secs(2 * 3600 + 5 * 60 + 59);
        assert_eq!(describe_dwell(spot, later), "occupied for 2 hours 5 minutes");
        assert_eq!(dwell(spot, t0 - Duration::from_secs(5)), Some(Duration::ZERO));
    }
}
