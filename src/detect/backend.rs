use anyhow::Result;

use crate::detect::result::ClassScores;
use crate::frame::PatchSize;

/// Occupancy classifier backend.
///
/// Receives one normalized CHW patch per call (see `Frame::patch_tensor`)
/// and returns the two class scores. Implementations must not retain the
/// tensor beyond the call.
pub trait OccupancyClassifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Patch shape this backend expects.
    fn input_size(&self) -> PatchSize {
        PatchSize::default()
    }

    fn classify(&mut self, tensor: &[f32]) -> Result<ClassScores>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
