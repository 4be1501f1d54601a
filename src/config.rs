use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{PatchSize, DEFAULT_PATCH_EDGE};
use crate::ingest::SourceConfig;
use crate::telemetry::{SendPolicy, WireFormat};

const DEFAULT_ROIS_PATH: &str = "rois.json";
const DEFAULT_SOURCE_URI: &str = "stub://parking_lot";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_TELEMETRY_HOST: &str = "::1";
const DEFAULT_TELEMETRY_PORT: u16 = 50000;
const DEFAULT_TELEMETRY_PERIOD_MS: u64 = 2_000;
const DEFAULT_CLASSIFIER_BACKEND: &str = "stub";
const DEFAULT_HANDOFF_CAPACITY: usize = 64;
const DEFAULT_POLL_INTERVAL_MS: u64 = 20;

#[derive(Debug, Deserialize, Default)]
struct SparkdConfigFile {
    rois_path: Option<PathBuf>,
    source: Option<SourceConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
    policy: Option<String>,
    min_period_ms: Option<u64>,
    format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    handoff_capacity: Option<usize>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SparkdConfig {
    pub rois_path: PathBuf,
    pub source: SourceConfig,
    pub telemetry: TelemetrySettings,
    pub classifier: ClassifierSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub policy: SendPolicy,
    /// Period used whenever the policy is `min_interval`.
    pub min_period: Duration,
    pub format: WireFormat,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input: PatchSize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Frames buffered between ingestion and processing.
    pub handoff_capacity: usize,
    /// How long either stage blocks before re-checking the stop token.
    pub poll_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl SparkdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SPARK_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`SparkdConfig::load`] with an explicit file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SparkdConfigFile) -> Result<Self> {
        let rois_path = file
            .rois_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROIS_PATH));

        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            uri: source_file
                .uri
                .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            max_frames: source_file.max_frames,
        };

        let telemetry_file = file.telemetry.unwrap_or_default();
        let min_period = Duration::from_millis(
            telemetry_file
                .min_period_ms
                .unwrap_or(DEFAULT_TELEMETRY_PERIOD_MS),
        );
        let policy = parse_policy(
            telemetry_file.policy.as_deref().unwrap_or("min_interval"),
            min_period,
        )?;
        let format = match telemetry_file.format.as_deref() {
            Some(name) => WireFormat::parse(name)
                .ok_or_else(|| anyhow!("unknown telemetry format '{}'", name))?,
            None => WireFormat::default(),
        };
        let telemetry = TelemetrySettings {
            enabled: telemetry_file.enabled.unwrap_or(true),
            host: telemetry_file
                .host
                .unwrap_or_else(|| DEFAULT_TELEMETRY_HOST.to_string()),
            port: telemetry_file.port.unwrap_or(DEFAULT_TELEMETRY_PORT),
            policy,
            min_period,
            format,
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let classifier = ClassifierSettings {
            backend: classifier_file
                .backend
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_BACKEND.to_string()),
            model_path: classifier_file.model_path,
            input: PatchSize::new(
                classifier_file.input_width.unwrap_or(DEFAULT_PATCH_EDGE),
                classifier_file.input_height.unwrap_or(DEFAULT_PATCH_EDGE),
            ),
        };

        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline = PipelineSettings {
            handoff_capacity: pipeline_file
                .handoff_capacity
                .unwrap_or(DEFAULT_HANDOFF_CAPACITY),
            poll_interval: Duration::from_millis(
                pipeline_file
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };

        Ok(Self {
            rois_path,
            source,
            telemetry,
            classifier,
            pipeline,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SPARK_ROIS_PATH") {
            if !path.trim().is_empty() {
                self.rois_path = PathBuf::from(path);
            }
        }
        if let Ok(uri) = std::env::var("SPARK_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(host) = std::env::var("SPARK_TELEMETRY_HOST") {
            if !host.trim().is_empty() {
                self.telemetry.host = host;
            }
        }
        if let Ok(port) = std::env::var("SPARK_TELEMETRY_PORT") {
            self.telemetry.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("SPARK_TELEMETRY_PORT must be a port number"))?;
        }
        let period_env = std::env::var("SPARK_TELEMETRY_PERIOD_MS").ok();
        if let Some(period) = period_env.as_deref() {
            let millis: u64 = period.trim().parse().map_err(|_| {
                anyhow!("SPARK_TELEMETRY_PERIOD_MS must be an integer number of milliseconds")
            })?;
            self.telemetry.min_period = Duration::from_millis(millis);
        }
        let policy_env = std::env::var("SPARK_TELEMETRY_POLICY")
            .ok()
            .filter(|policy| !policy.trim().is_empty());
        if period_env.is_some() || policy_env.is_some() {
            let name = match (policy_env.as_deref(), self.telemetry.policy) {
                (Some(name), _) => name,
                (None, SendPolicy::MinInterval(_)) => "min_interval",
                (None, SendPolicy::SuppressDuplicates) => "suppress_duplicates",
            };
            self.telemetry.policy = parse_policy(name, self.telemetry.min_period)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.telemetry.port == 0 {
            return Err(anyhow!("telemetry port must be non-zero"));
        }
        if self.telemetry.host.trim().is_empty() {
            return Err(anyhow!("telemetry host must not be empty"));
        }
        if self.pipeline.handoff_capacity == 0 {
            return Err(anyhow!("pipeline handoff_capacity must be greater than zero"));
        }
        if self.pipeline.poll_interval.is_zero() {
            return Err(anyhow!("pipeline poll_interval_ms must be greater than zero"));
        }
        if self.classifier.input.width == 0 || self.classifier.input.height == 0 {
            return Err(anyhow!("classifier input size must be non-zero"));
        }
        match self.classifier.backend.as_str() {
            "stub" => {}
            "tract" => {
                if self.classifier.model_path.is_none() {
                    return Err(anyhow!("tract classifier requires classifier.model_path"));
                }
            }
            other => return Err(anyhow!("unknown classifier backend '{}'", other)),
        }
        Ok(())
    }
}

fn parse_policy(name: &str, min_period: Duration) -> Result<SendPolicy> {
    match name.trim().to_ascii_lowercase().as_str() {
        "min_interval" => Ok(SendPolicy::MinInterval(min_period)),
        "suppress_duplicates" => Ok(SendPolicy::SuppressDuplicates),
        other => Err(anyhow!(
            "unknown telemetry policy '{}' (expected min_interval or suppress_duplicates)",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<SparkdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
