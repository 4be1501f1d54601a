use anyhow::{anyhow, Result};

/// Two-class output of an occupancy classifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassScores {
    pub empty: f32,
    pub occupied: f32,
}

impl ClassScores {
    pub fn new(empty: f32, occupied: f32) -> Self {
        Self { empty, occupied }
    }

    /// Interpret a raw score vector ordered `[empty, occupied]`.
    pub fn from_slice(scores: &[f32]) -> Result<Self> {
        match scores {
            [empty, occupied] => Ok(Self::new(*empty, *occupied)),
            other => Err(anyhow!(
                "classifier returned {} scores, expected 2",
                other.len()
            )),
        }
    }

    /// Occupied only when its score is strictly greater. Ties and NaN are empty.
    pub fn is_occupied(&self) -> bool {
        self.empty < self.occupied
    }
}
