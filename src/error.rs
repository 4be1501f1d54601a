use std::io;

use thiserror::Error;

/// Typed failures that callers may want to match on.
///
/// Everything else in the crate reports through `anyhow`; these variants
/// convert into `anyhow::Error` with `?`.
#[derive(Debug, Error)]
pub enum SparkError {
    #[error("invalid region {width}x{height} at ({x}, {y}): zero area")]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error("failed to resolve telemetry endpoint {endpoint}: {source}")]
    AddressResolution {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to create telemetry socket for {endpoint}: {source}")]
    SocketCreation {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}
