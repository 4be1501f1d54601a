//! Parking Spot Occupancy Monitor
//!
//! Watches a fixed camera view of a parking area, classifies each marked spot
//! as EMPTY or OCCUPIED on every frame, and pushes a compact status payload
//! to a local dashboard bridge over UDP.
//!
//! # Architecture
//!
//! Frames flow through two threads joined by a bounded FIFO:
//!
//! 1. **Ingestion** pulls frames from a source (synthetic, stills, camera or
//!    video file) and hands them off in capture order.
//! 2. **Processing** crops every spot, runs the classifier, updates the spot
//!    state machine, and offers one telemetry payload per frame.
//!
//! Telemetry is throttled either by a minimum period between sends or by
//! suppressing payloads identical to the last one delivered.
//!
//! # Module Structure
//!
//! - `registry`: spots, regions and slot ids
//! - `occupancy`: per-spot EMPTY/OCCUPIED state machine
//! - `telemetry`: payload encoding and the throttled UDP transport
//! - `frame`: decoded frames and classifier patch extraction
//! - `detect`: classifier backends (stub, ONNX via tract)
//! - `ingest`: frame sources
//! - `pipeline`: the two-stage monitor session
//! - `storage`: ROI file persistence
//! - `config`: daemon configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod occupancy;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod telemetry;

pub use config::{ClassifierSettings, PipelineSettings, SparkdConfig, TelemetrySettings};
pub use detect::{build_classifier, ClassScores, OccupancyClassifier, StubClassifier};
pub use error::SparkError;
pub use frame::{Frame, PatchSize};
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats};
pub use occupancy::{describe_dwell, dwell, occupancy_label, OccupancyTracker, Transition};
pub use pipeline::{MonitorSession, SessionReport, StopToken};
pub use registry::{Rect, Spot, SpotRegistry};
pub use storage::RoiStore;
pub use telemetry::{
    encode, DatagramChannel, Payload, SendPolicy, TelemetrySink, ThrottledTransport,
    TransportStats, UdpChannel, WireFormat,
};
