//! sparkd - parking spot occupancy monitor daemon
//!
//! This daemon:
//! 1. Loads spot regions from the ROI file
//! 2. Reads frames from the configured source
//! 3. Classifies every spot on every frame and tracks state changes
//! 4. Sends throttled occupancy payloads to the dashboard bridge over UDP
//! 5. Logs a per-spot status summary at a fixed interval
//!
//! Ctrl-C stops the session; all spots are reported offline on exit.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use spark_occupancy::{
    build_classifier, describe_dwell, open_source, MonitorSession, RoiStore, SparkdConfig,
    SpotRegistry, TelemetrySink, ThrottledTransport,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Parking spot occupancy monitor")]
struct Args {
    /// JSON config file (overrides SPARK_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame source: stub://name, camera:N, a stills directory, or a video file.
    #[arg(long)]
    source: Option<String>,

    /// ROI file to load spots from.
    #[arg(long)]
    rois: Option<PathBuf>,

    /// Run without sending telemetry.
    #[arg(long)]
    no_telemetry: bool,

    /// Seconds between status summaries.
    #[arg(long, default_value_t = 30)]
    status_interval_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match args.config.as_deref() {
        Some(path) => SparkdConfig::load_from(Some(path))?,
        None => SparkdConfig::load()?,
    };
    if let Some(source) = args.source {
        cfg.source.uri = source;
    }
    if let Some(rois) = args.rois {
        cfg.rois_path = rois;
    }

    let store = RoiStore::new(&cfg.rois_path);
    let mut registry = SpotRegistry::new();
    store.load_into(&mut registry)?;
    if registry.is_empty() {
        log::warn!(
            "no spots defined in {}; add some with spark_rois",
            cfg.rois_path.display()
        );
    }
    let registry = Arc::new(Mutex::new(registry));

    let sink: Option<Box<dyn TelemetrySink>> = if args.no_telemetry || !cfg.telemetry.enabled {
        log::info!("telemetry disabled");
        None
    } else {
        match ThrottledTransport::connect(
            &cfg.telemetry.host,
            cfg.telemetry.port,
            cfg.telemetry.policy,
            cfg.telemetry.format,
        ) {
            Ok(transport) => {
                log::info!(
                    "telemetry to {} ({:?}, {:?})",
                    transport.channel().remote(),
                    cfg.telemetry.policy,
                    cfg.telemetry.format
                );
                Some(Box::new(transport))
            }
            Err(err) => {
                log::error!("telemetry unavailable, continuing without it: {}", err);
                None
            }
        }
    };

    let classifier = build_classifier(&cfg.classifier)?;
    let source = open_source(cfg.source.clone())?;
    let session = MonitorSession::start(
        source,
        classifier,
        sink,
        registry.clone(),
        cfg.pipeline.clone(),
    )?;

    let stop = session.stop_token();
    ctrlc::set_handler(move || {
        stop.cancel();
    })
    .expect("error setting Ctrl-C handler");

    log::info!("sparkd running. source={}", cfg.source.uri);

    let status_interval = Duration::from_secs(args.status_interval_secs.max(1));
    let mut last_status = Instant::now();
    while !session.is_finished() {
        std::thread::sleep(Duration::from_millis(100));
        if last_status.elapsed() >= status_interval {
            log_status(&registry);
            last_status = Instant::now();
        }
    }

    let report = session.join()?;
    log_status(&registry);
    log::info!(
        "session ended: ingested={} processed={} readings={} transitions={} sent={} skipped={} classifier_errors={}",
        report.frames_ingested,
        report.frames_processed,
        report.readings,
        report.transitions,
        report.telemetry_sent,
        report.telemetry_skipped,
        report.classifier_errors
    );
    if let Some(err) = report.source_error {
        log::warn!("source stopped with error: {}", err);
    }
    Ok(())
}

fn log_status(registry: &Mutex<SpotRegistry>) {
    let Ok(registry) = registry.lock() else {
        log::error!("status unavailable: spot registry lock poisoned");
        return;
    };
    let now = SystemTime::now();
    log::info!("monitoring {} slots", registry.len());
    for spot in registry.snapshot() {
        log::info!(
            "{} online={} {}",
            spot,
            spot.is_online(),
            describe_dwell(spot, now)
        );
    }
}
