//! End-to-end tests of the processing run

use chrono::NaiveDate;
use meteoalert::gate::MarkerStatus;
use meteoalert::{
    AlertRecord, AppConfig, ControlGate, JsonFileSink, MarkerPolicy, MemorySink, Pipeline,
    RuleSet, Severity, Variable,
};
use std::sync::Arc;
use tempfile::TempDir;

const SOURCE: &str = "HST20240101-MeteogramASC.out";

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn rules(table: &str) -> RuleSet {
    RuleSet::from_csv_str(&format!(
        "location,variable,bound,comparison,severity\n{table}"
    ))
    .unwrap()
}

fn file_gate(dir: &TempDir, policy: MarkerPolicy) -> ControlGate {
    ControlGate::with_directory(dir.path().join("control"), policy).unwrap()
}

fn meteogram(rows: &[&str]) -> String {
    let mut content = String::from(
        "REFERENCE 2024-01-01T00:00:00Z\nLOCATION campinas P042 Campinas\nBLOCK P042\n",
    );
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    content.push_str("END\n");
    content
}

#[tokio::test]
async fn test_heat_peak_raises_one_alert() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(
        rules(",temperature,38,max,high\n"),
        file_gate(&dir, MarkerPolicy::Always),
        sink.clone(),
    );
    let content = meteogram(&[
        "0, 35, 50, 10, 0",
        "3600, 37, 50, 10, 0",
        "7200, 39, 50, 10, 0",
        "10800, 36, 50, 10, 0",
    ]);

    let outcome = pipeline.run(SOURCE, day(), &content).await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].observed, 39.0);
    assert_eq!(report.alerts[0].variable, Variable::Temperature);
    assert_eq!(report.alerts[0].severity, Severity::High);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].event_type, "temperature_high");
    assert_eq!(batches[0][0].location_id, "campinas");
    assert_eq!(batches[0][0].reference_time, "23:00:00");
}

#[tokio::test]
async fn test_humidity_above_floor_raises_nothing() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(
        rules(",humidity,20,min,medium\n"),
        file_gate(&dir, MarkerPolicy::Always),
        sink.clone(),
    );
    let content = meteogram(&["0, 25, 25, 10, 0", "3600, 25, 30, 10, 0", "7200, 25, 22, 10, 0"]);

    let outcome = pipeline.run(SOURCE, day(), &content).await.unwrap();

    let report = outcome.report().unwrap();
    assert!(report.alerts.is_empty());
    assert!(!report.delivered);
    assert!(sink.batches().is_empty());
    assert!(pipeline.gate().already_processed(SOURCE, day()).unwrap());
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        rules(",temperature,38,max,high\n"),
        file_gate(&dir, MarkerPolicy::Always),
        Arc::new(MemorySink::new()),
    );
    let content = meteogram(&[
        "0, 35, 50, 10, 0",
        "3600, 37, fifty",
        "7200, 36, 50, 10, 0",
    ]);

    let outcome = pipeline.run(SOURCE, day(), &content).await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.points, 2);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].line, 5);
    assert!(report.alerts.is_empty());
}

#[tokio::test]
async fn test_rerun_same_day_is_skipped() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(
        rules(",temperature,38,max,high\n"),
        file_gate(&dir, MarkerPolicy::Always),
        sink.clone(),
    );
    let content = meteogram(&["0, 40, 50, 10, 0"]);

    let first = pipeline.run(SOURCE, day(), &content).await.unwrap();
    assert!(!first.is_skipped());

    let second = pipeline.run(SOURCE, day(), &content).await.unwrap();
    assert!(second.is_skipped());
    assert!(second.report().is_none());
    assert_eq!(sink.batches().len(), 1);

    // a new processing date starts fresh
    let next_day = day().succ_opt().unwrap();
    let third = pipeline.run(SOURCE, next_day, &content).await.unwrap();
    assert!(!third.is_skipped());
}

#[tokio::test]
async fn test_fatal_parse_error_keeps_marker_by_default() {
    let dir = TempDir::new().unwrap();
    let gate = file_gate(&dir, MarkerPolicy::Always);
    let pipeline = Pipeline::new(
        rules(",temperature,38,max,high\n"),
        gate,
        Arc::new(MemorySink::new()),
    );

    let err = pipeline
        .run(SOURCE, day(), "no header here\n")
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "parse");

    let marker = dir
        .path()
        .join("control")
        .join("HST20240101-MeteogramASC.out.2024-01-01.processed");
    let record: meteoalert::gate::MarkerRecord =
        serde_json::from_str(&std::fs::read_to_string(marker).unwrap()).unwrap();
    assert_eq!(record.status, MarkerStatus::Failed);
    assert!(record.error.unwrap().contains("No locations"));

    let rerun = pipeline.run(SOURCE, day(), &meteogram(&["0, 40, 50, 10, 0"])).await.unwrap();
    assert!(rerun.is_skipped());
}

#[tokio::test]
async fn test_success_only_policy_allows_retry_after_failure() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        rules(",temperature,38,max,high\n"),
        file_gate(&dir, MarkerPolicy::SuccessOnly),
        Arc::new(MemorySink::new()),
    );

    assert!(pipeline.run(SOURCE, day(), "garbage\n").await.is_err());
    assert!(!pipeline.gate().already_processed(SOURCE, day()).unwrap());

    let retry = pipeline
        .run(SOURCE, day(), &meteogram(&["0, 40, 50, 10, 0"]))
        .await
        .unwrap();
    assert_eq!(retry.report().unwrap().alerts.len(), 1);
}

#[tokio::test]
async fn test_run_from_config_writes_alert_file() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();

    let thresholds = dir.path().join("thresholds.csv");
    std::fs::write(
        &thresholds,
        "location,variable,bound,comparison,severity\n,wind_speed,60,max,high\n,rain,15,max,medium\n",
    )
    .unwrap();

    let export = "\
TEMPERATURE_UNIT K
WIND_UNIT m/s
LOCATION santos P043 Santos
BLOCK P043
2024-01-01 06:00, 300.15, 80, 20.0, 16.0
2024-01-01 09:00, 301.15, 82, 10.0, 2.0
";
    std::fs::write(data.join("HST2024010100-MeteogramASC.out"), export).unwrap();

    let mut config = AppConfig::default();
    config.source.directory = data.to_string_lossy().into_owned();
    config.thresholds.path = thresholds.to_string_lossy().into_owned();
    config.control.directory = dir.path().join("control").to_string_lossy().into_owned();
    config.export.path = dir.path().join("out/alerts.json").to_string_lossy().into_owned();
    config.export.timezone = "UTC".to_string();

    let pipeline = Pipeline::from_config(&config).unwrap();
    let outcome = pipeline.run_latest(&config.source, day()).await.unwrap();
    assert_eq!(outcome.report().unwrap().alerts.len(), 2);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("out/alerts.json")).unwrap())
            .unwrap();
    let alerts: Vec<AlertRecord> = serde_json::from_value(written["alerts"].clone()).unwrap();
    let kinds: Vec<_> = alerts.iter().map(|a| a.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["wind_speed_high", "rainfall_high"]);
    assert_eq!(alerts[0].observed_value, 72.0);
    assert_eq!(alerts[0].reference_time, "06:00:00");

    let again = pipeline.run_latest(&config.source, day()).await.unwrap();
    assert!(again.is_skipped());
}

#[test]
fn test_json_sink_is_constructible_from_config_defaults() {
    let config = AppConfig::default();
    let sink = JsonFileSink::new(&config.export.path);
    assert!(sink.path().ends_with("alerts.json"));
}
