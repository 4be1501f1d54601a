use anyhow::{anyhow, Result};

use crate::detect::backend::OccupancyClassifier;
use crate::detect::result::ClassScores;
use crate::frame::PatchSize;

/// Deterministic brightness classifier for synthetic sources and tests.
///
/// The occupied score is the mean intensity of the patch and the empty score
/// is the fixed threshold, so bright patches read as taken.
pub struct StubClassifier {
    input: PatchSize,
    threshold: f32,
}

impl StubClassifier {
    pub fn new(input: PatchSize) -> Self {
        Self {
            input,
            threshold: 0.5,
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new(PatchSize::default())
    }
}

impl OccupancyClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> PatchSize {
        self.input
    }

    fn classify(&mut self, tensor: &[f32]) -> Result<ClassScores> {
        if tensor.len() != self.input.tensor_len() {
            return Err(anyhow!(
                "expected {} tensor values, received {}",
                self.input.tensor_len(),
                tensor.len()
            ));
        }
        let mean = tensor.iter().sum::<f32>() / tensor.len() as f32;
        Ok(ClassScores::new(self.threshold, mean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bright_patches_read_as_occupied() {
        let size = PatchSize::new(2, 2);
        let mut classifier = StubClassifier::new(size);

        let bright = classifier.classify(&vec![0.9; size.tensor_len()]).unwrap();
        assert!(bright.is_occupied());

        let dark = classifier.classify(&vec![0.1; size.tensor_len()]).unwrap();
        assert!(!dark.is_occupied());
    }

    #[test]
    fn wrong_tensor_length_is_rejected() {
        let mut classifier = StubClassifier::default();
        assert!(classifier.classify(&[0.5; 3]).is_err());
    }
}
