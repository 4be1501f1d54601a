use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use spark_occupancy::config::SparkdConfig;
use spark_occupancy::{SendPolicy, WireFormat};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SPARK_CONFIG",
        "SPARK_ROIS_PATH",
        "SPARK_SOURCE",
        "SPARK_TELEMETRY_HOST",
        "SPARK_TELEMETRY_PORT",
        "SPARK_TELEMETRY_POLICY",
        "SPARK_TELEMETRY_PERIOD_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SparkdConfig::load().expect("load config");

    assert_eq!(cfg.rois_path, PathBuf::from("rois.json"));
    assert_eq!(cfg.source.uri, "stub://parking_lot");
    assert_eq!(cfg.source.target_fps, 10);
    assert!(cfg.telemetry.enabled);
    assert_eq!(cfg.telemetry.host, "::1");
    assert_eq!(cfg.telemetry.port, 50000);
    assert_eq!(
        cfg.telemetry.policy,
        SendPolicy::MinInterval(Duration::from_secs(2))
    );
    assert_eq!(cfg.telemetry.format, WireFormat::Json);
    assert_eq!(cfg.classifier.backend, "stub");
    assert_eq!(
        (cfg.classifier.input.width, cfg.classifier.input.height),
        (28, 28)
    );
    assert_eq!(cfg.pipeline.handoff_capacity, 64);
    assert_eq!(cfg.pipeline.poll_interval, Duration::from_millis(20));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "rois_path": "/opt/spark/rois.json",
            "source": {
                "uri": "camera:0",
                "target_fps": 5,
                "max_frames": 100
            },
            "telemetry": {
                "host": "127.0.0.1",
                "port": 41000,
                "policy": "min_interval",
                "min_period_ms": 500,
                "format": "counts"
            },
            "classifier": {
                "input_width": 32,
                "input_height": 24
            },
            "pipeline": {
                "handoff_capacity": 8,
                "poll_interval_ms": 50
            }
        }"#,
    );

    std::env::set_var("SPARK_CONFIG", file.path());
    std::env::set_var("SPARK_SOURCE", "/var/spark/frames");
    std::env::set_var("SPARK_TELEMETRY_PORT", "42000");
    std::env::set_var("SPARK_TELEMETRY_PERIOD_MS", "750");

    let cfg = SparkdConfig::load().expect("load config");

    assert_eq!(cfg.rois_path, PathBuf::from("/opt/spark/rois.json"));
    assert_eq!(cfg.source.uri, "/var/spark/frames");
    assert_eq!(cfg.source.target_fps, 5);
    assert_eq!(cfg.source.max_frames, Some(100));
    assert_eq!(cfg.telemetry.host, "127.0.0.1");
    assert_eq!(cfg.telemetry.port, 42000);
    assert_eq!(
        cfg.telemetry.policy,
        SendPolicy::MinInterval(Duration::from_millis(750))
    );
    assert_eq!(cfg.telemetry.format, WireFormat::Counts);
    assert_eq!(
        (cfg.classifier.input.width, cfg.classifier.input.height),
        (32, 24)
    );
    assert_eq!(cfg.pipeline.handoff_capacity, 8);
    assert_eq!(cfg.pipeline.poll_interval, Duration::from_millis(50));

    clear_env();
}

#[test]
fn policy_env_selects_duplicate_suppression() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SPARK_TELEMETRY_POLICY", "suppress_duplicates");
    let cfg = SparkdConfig::load().expect("load config");
    assert_eq!(cfg.telemetry.policy, SendPolicy::SuppressDuplicates);

    clear_env();
}

#[test]
fn policy_env_keeps_period_from_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{"telemetry": {"policy": "suppress_duplicates", "min_period_ms": 5000}}"#,
    );
    std::env::set_var("SPARK_CONFIG", file.path());

    let cfg = SparkdConfig::load().expect("load config");
    assert_eq!(cfg.telemetry.policy, SendPolicy::SuppressDuplicates);
    assert_eq!(cfg.telemetry.min_period, Duration::from_secs(5));

    std::env::set_var("SPARK_TELEMETRY_POLICY", "min_interval");
    let cfg = SparkdConfig::load().expect("load config");
    assert_eq!(
        cfg.telemetry.policy,
        SendPolicy::MinInterval(Duration::from_secs(5))
    );

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{"telemetry": {"port": 0}}"#,
        r#"{"telemetry": {"policy": "whenever"}}"#,
        r#"{"telemetry": {"format": "xml"}}"#,
        r#"{"pipeline": {"handoff_capacity": 0}}"#,
        r#"{"pipeline": {"poll_interval_ms": 0}}"#,
        r#"{"classifier": {"input_width": 0}}"#,
        r#"{"classifier": {"backend": "tract"}}"#,
        r#"{"classifier": {"backend": "yolo"}}"#,
    ] {
        let file = write_config(json);
        assert!(
            SparkdConfig::load_from(Some(file.path())).is_err(),
            "accepted {}",
            json
        );
    }

    std::env::set_var("SPARK_TELEMETRY_PORT", "not-a-port");
    assert!(SparkdConfig::load().is_err());

    clear_env();
}
