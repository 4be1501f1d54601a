//! Occupancy classification backends.
//!
//! The inference engine is opaque to the rest of the crate: it receives a
//! normalized patch tensor and returns `[empty, occupied]` scores.

mod backend;
mod backends;
mod result;

use anyhow::{anyhow, Result};

pub use backend::OccupancyClassifier;
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use result::ClassScores;

use crate::config::ClassifierSettings;

/// Build the classifier named in the configuration.
pub fn build_classifier(settings: &ClassifierSettings) -> Result<Box<dyn OccupancyClassifier>> {
    let mut classifier: Box<dyn OccupancyClassifier> = match settings.backend.as_str() {
        "stub" => Box::new(StubClassifier::new(settings.input)),
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract backend requires classifier.model_path"))?;
            Box::new(TractClassifier::new(model_path, settings.input)?)
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            return Err(anyhow!(
                "tract classifier requires the backend-tract feature"
            ))
        }
        other => return Err(anyhow!("unknown classifier backend '{}'", other)),
    };
    classifier.warm_up()?;
    log::info!(
        "classifier backend '{}' ready ({}x{} input)",
        classifier.name(),
        settings.input.width,
        settings.input.height
    );
    Ok(classifier)
}
