//! Configuration and schedule files through the public API

use groundgate::config::DocumentFormat;
use groundgate::{Config, FramingKind, GatewayError, OfflinePlatform, PlatformClient};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("groundgate-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).expect("write temp file");
    path
}

#[test]
fn yaml_config_with_every_section() {
    let path = temp_file(
        "full.yml",
        r#"
GroundStation:
  Name: Svalbard
  ID: gs-7
  PlanUpdateInterval: 120
Data:
  - Name: uhf
    Address: 0.0.0.0:5000
    Framing: AX25
  - Name: iq
    Address: 0.0.0.0:5001
    Framing: IQ
    Channel: ch-2
Schedulers:
  - Name: admin
    Address: 0.0.0.0:8080
"#,
    );
    let config = Config::load(&path);
    let _ = std::fs::remove_file(&path);
    let config = config.expect("valid config");

    assert_eq!(config.ground_station.name, "Svalbard");
    assert_eq!(config.ground_station.plan_update_interval(), Duration::from_secs(120));
    assert_eq!(config.data[0].framing, FramingKind::Ax25);
    assert_eq!(config.data[1].channel.as_deref(), Some("ch-2"));
    assert_eq!(config.schedulers.len(), 1);
}

#[test]
fn unsupported_config_extension_is_fatal() {
    let path = temp_file("config.toml", "GroundStation = {}");
    let result = Config::load(&path);
    let _ = std::fs::remove_file(&path);

    let error = result.expect_err("toml is not supported");
    assert!(matches!(error, GatewayError::UnsupportedConfigFormat { .. }));
    assert!(error.is_fatal());
}

#[test]
fn malformed_config_names_the_file() {
    let error = Config::parse("{\"Data\": [", DocumentFormat::Json).expect_err("truncated json");
    assert!(matches!(error, GatewayError::Config { .. }));
}

#[tokio::test]
async fn offline_platform_serves_plans_from_a_schedule() {
    let path = temp_file(
        "schedule.json",
        r#"{"Plans": [
            {"PlanId": "near",
             "AosTime": {"Seconds": 4102444800},
             "LosTime": {"Seconds": 4102445400}},
            {"PlanId": "old", "AosTime": {"Seconds": 0}, "LosTime": {"Seconds": 600}}
        ]}"#,
    );
    let platform = OfflinePlatform::from_schedule_file(&path);
    let _ = std::fs::remove_file(&path);
    let platform = platform.expect("valid schedule");
    assert_eq!(platform.plans().len(), 2);

    // 2100-01-01, ten minutes on either side of the "near" pass.
    let start = SystemTime::UNIX_EPOCH + Duration::from_secs(4_102_444_200);
    let end = SystemTime::UNIX_EPOCH + Duration::from_secs(4_102_446_000);
    let plans = platform.list_plans(start, end).await.expect("list");
    let ids: Vec<_> = plans.iter().map(|p| p.plan_id.as_str()).collect();
    assert_eq!(ids, vec!["near"]);
}
