//! Local frame source.
//!
//! `FileSource` picks a backend from the configured URI:
//! - `stub://name`: synthetic parking lot scene, generated in memory
//! - a directory: JPEG/PNG stills in file-name order
//! - `camera:N` / `0` / anything else: FFmpeg decode (feature: ingest-ffmpeg)
//!
//! Remote URL schemes are rejected; the monitor only reads local media.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegSource;
use super::{FramePacer, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const STILL_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Local frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Stills(StillSequenceSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegSource),
}

impl FileSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !is_local_uri(&config.uri) {
            return Err(anyhow!(
                "source '{}' is not local (only stub://, camera:N, and file paths are supported)",
                config.uri
            ));
        }
        let backend = if config.uri.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticSource::new(config))
        } else if Path::new(&config.uri).is_dir() {
            FileBackend::Stills(StillSequenceSource::new(config)?)
        } else {
            #[cfg(feature = "ingest-ffmpeg")]
            {
                FileBackend::Ffmpeg(FfmpegSource::new(config)?)
            }
            #[cfg(not(feature = "ingest-ffmpeg"))]
            {
                return Err(anyhow!(
                    "source '{}' requires the ingest-ffmpeg feature",
                    config.uri
                ))
            }
        };
        Ok(Self { backend })
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            FileBackend::Stills(source) => source.connect(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Stills(source) => source.next_frame(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Stills(source) => source.stats(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// Number of vertical bands in the synthetic scene.
const SYNTHETIC_BANDS: u32 = 8;
/// Frames between scene changes.
const SYNTHETIC_SCENE_PERIOD: u64 = 50;

/// Synthetic lot: the frame is split into vertical bands, and every third
/// band (shifted each scene change) is bright, which the stub classifier
/// reads as a parked car.
struct SyntheticSource {
    config: SourceConfig,
    pacer: FramePacer,
    frame_count: u64,
    scene_state: u32,
}

impl SyntheticSource {
    fn new(config: SourceConfig) -> Self {
        Self {
            pacer: FramePacer::new(config.target_fps),
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: connected to {} (synthetic)", self.config.uri);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if reached_limit(self.frame_count, self.config.max_frames) {
            return Ok(None);
        }
        self.pacer.wait();
        self.frame_count += 1;
        if self.frame_count % SYNTHETIC_SCENE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
        .map(Some)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width.max(1);
        let band_width = (width / SYNTHETIC_BANDS).max(1);
        let row: Vec<u8> = (0..self.config.width)
            .flat_map(|x| {
                let band = x / band_width;
                let value = if (band + self.scene_state) % 3 == 0 {
                    230
                } else {
                    30
                };
                [value; 3]
            })
            .collect();
        row.repeat(self.config.height as usize)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.uri.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Directory of stills
// ----------------------------------------------------------------------------

struct StillSequenceSource {
    config: SourceConfig,
    pacer: FramePacer,
    paths: Vec<PathBuf>,
    frame_count: u64,
}

impl StillSequenceSource {
    fn new(config: SourceConfig) -> Result<Self> {
        let mut paths = Vec::new();
        let entries = std::fs::read_dir(&config.uri)
            .with_context(|| format!("failed to list frame directory {}", config.uri))?;
        for entry in entries {
            let path = entry?.path();
            if is_still(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        if paths.is_empty() {
            return Err(anyhow!("frame directory {} has no JPEG/PNG files", config.uri));
        }
        Ok(Self {
            pacer: FramePacer::new(config.target_fps),
            config,
            paths,
            frame_count: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: connected to {} ({} stills)",
            self.config.uri,
            self.paths.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if reached_limit(self.frame_count, self.config.max_frames) {
            return Ok(None);
        }
        let Some(path) = self.paths.get(self.frame_count as usize) else {
            return Ok(None);
        };
        self.pacer.wait();
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        self.frame_count += 1;
        let (width, height) = image.dimensions();
        Frame::new(image.into_raw(), width, height, self.frame_count).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.uri.clone(),
        }
    }
}

fn is_still(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            STILL_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn reached_limit(frame_count: u64, max_frames: Option<u64>) -> bool {
    max_frames.is_some_and(|max| frame_count >= max)
}

fn is_local_uri(uri: &str) -> bool {
    if uri.trim().is_empty() {
        return false;
    }
    if uri.starts_with("stub://") || uri.starts_with("camera:") {
        return true;
    }
    !uri.contains("://")
}
