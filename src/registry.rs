//! Monitored parking spots and their geometry.
//!
//! `SpotRegistry` is the single owner of `Spot` lifetimes. Insertion order is
//! the reporting order, and `slot_id` is always position + 1 at creation time.
//! Regions are validated here so a zero-area rectangle never reaches the
//! pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SparkError;

/// Axis-aligned rectangle in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from two opposite corners in any order.
    pub fn from_corners(a: (u32, u32), b: (u32, u32)) -> Self {
        let x = a.0.min(b.0);
        let y = a.1.min(b.1);
        Self {
            x,
            y,
            width: a.0.max(b.0) - x,
            height: a.1.max(b.1) - y,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersection with a `width` x `height` image, or `None` if nothing overlaps.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        let clamped = Rect::new(x0, y0, x1 - x0, y1 - y0);
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }

    fn validate(self) -> Result<Self, SparkError> {
        if self.is_empty() {
            return Err(SparkError::InvalidRegion {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// One monitored parking space.
#[derive(Clone, Debug, PartialEq)]
pub struct Spot {
    slot_id: u32,
    region: Rect,
    pub(crate) is_occupied: bool,
    pub(crate) is_online: bool,
    pub(crate) last_change_time: Option<SystemTime>,
}

impl Spot {
    fn fresh(slot_id: u32, region: Rect) -> Self {
        Self {
            slot_id,
            region,
            is_occupied: false,
            is_online: false,
            last_change_time: None,
        }
    }

    pub fn slot_id(&self) -> u32 {
        self.slot_id
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn is_occupied(&self) -> bool {
        self.is_occupied
    }

    /// True once inference has produced at least one reading for this spot
    /// during the current session.
    pub fn is_online(&self) -> bool {
        self.is_online
    }

    /// Wall-clock time of the most recent occupancy flip, if any.
    pub fn last_change_time(&self) -> Option<SystemTime> {
        self.last_change_time
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let changed = self
            .last_change_time
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs().to_string())
            .unwrap_or_default();
        write!(
            f,
            "{{slot_id: {}, is_occupied: {}, last_change_time: {}}}",
            self.slot_id, self.is_occupied as u8, changed
        )
    }
}

/// Ordered collection of monitored spots.
#[derive(Clone, Debug, Default)]
pub struct SpotRegistry {
    spots: Vec<Spot>,
}

impl SpotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted regions.
    pub fn from_regions<I>(regions: I) -> Result<Self, SparkError>
    where
        I: IntoIterator<Item = Rect>,
    {
        let mut registry = Self::new();
        registry.load(regions)?;
        Ok(registry)
    }

    /// Append a new spot. Its id is the registry length after insertion.
    pub fn create(&mut self, region: Rect) -> Result<&Spot, SparkError> {
        let region = region.validate()?;
        let slot_id = self.spots.len() as u32 + 1;
        self.spots.push(Spot::fresh(slot_id, region));
        Ok(&self.spots[self.spots.len() - 1])
    }

    /// Drop the most recently created spot. Empty registries are left alone.
    pub fn remove_last(&mut self) -> Option<Spot> {
        self.spots.pop()
    }

    /// Replace the registry contents with fresh spots for `regions`.
    ///
    /// Ids are re-derived from position. If any region is invalid the registry
    /// is left untouched.
    pub fn load<I>(&mut self, regions: I) -> Result<(), SparkError>
    where
        I: IntoIterator<Item = Rect>,
    {
        let spots = regions
            .into_iter()
            .enumerate()
            .map(|(i, region)| Ok(Spot::fresh(i as u32 + 1, region.validate()?)))
            .collect::<Result<Vec<_>, SparkError>>()?;
        self.spots = spots;
        Ok(())
    }

    pub fn snapshot(&self) -> &[Spot] {
        &self.spots
    }

    pub fn regions(&self) -> Vec<Rect> {
        self.spots.iter().map(|spot| spot.region).collect()
    }

    pub fn get(&self, slot_id: u32) -> Option<&Spot> {
        self.spots.iter().find(|spot| spot.slot_id == slot_id)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Spot> {
        self.spots.get_mut(index)
    }

    /// Called when a monitoring session ends.
    pub fn mark_all_offline(&mut self) {
        for spot in &mut self.spots {
            spot.is_online = false;
        }
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }
}
