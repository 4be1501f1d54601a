//! Frame ingestion sources.
//!
//! This module provides the sources the pipeline can read from:
//! - Synthetic scenes (`stub://name`) for demos and tests
//! - Directories of JPEG/PNG stills, read in file-name order
//! - Video files and cameras (`camera:N`, or `0`) via FFmpeg
//!   (feature: ingest-ffmpeg)
//!
//! Every source produces `Frame` values numbered in capture order. End of
//! stream is `Ok(None)`; a read failure is an `Err`. The pipeline reacts to
//! both by closing the frame hand-off.

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::Frame;

pub use file::FileSource;

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://name`, `camera:N`, `0`, a directory of stills, or a video file.
    pub uri: String,
    /// Target frame rate. Sources sleep to stay at or below it; 0 disables pacing.
    pub target_fps: u32,
    /// Frame width for synthetic sources.
    pub width: u32,
    /// Frame height for synthetic sources.
    pub height: u32,
    /// Report end of stream after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://parking_lot".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// A video source the ingestion stage pulls frames from.
pub trait FrameSource: Send {
    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame in capture order, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

/// Open the source described by `config`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FileSource::new(config)?))
}

/// Sleeps just long enough to keep successive frames `1 / fps` apart.
#[derive(Debug)]
pub(crate) struct FramePacer {
    interval: Option<Duration>,
    last_frame_at: Option<Instant>,
}

impl FramePacer {
    pub(crate) fn new(target_fps: u32) -> Self {
        let interval = (target_fps > 0).then(|| Duration::from_secs(1) / target_fps);
        Self {
            interval,
            last_frame_at: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}
