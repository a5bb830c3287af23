// Tests for end-to-end runs against scripted page loads

use footprint_capture::{
    CaptureError, CaptureOptions, RequestEvent, ScriptStep, ScriptedBrowser, SessionEvent,
    Termination,
};
use footprint_core::artifact::ArtifactFormat;
use footprint_core::geo::{GeoCoordinate, GeoDbError};
use footprint_core::origin::OriginPolicy;
use footprint_core::pipeline::{RunError, RunOptions, execute_run};
use footprint_core::summary::generate_run_report;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const GEO_CSV: &str = r#""16843008","16843263","AU","Australia","New South Wales","Sydney","-33.867850","151.207320"
"134744064","134744319","US","United States of America","California","Mountain View","37.405992","-122.078515"
"1572395008","1572395263","US","United States of America","Massachusetts","Norwell","42.157500","-70.821800"
"#;

fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("IP2LOCATION-LITE-DB5.CSV");
    fs::write(&db, GEO_CSV).unwrap();
    (dir, db)
}

fn options(db: &Path, output: PathBuf, format: ArtifactFormat) -> RunOptions {
    RunOptions {
        target: Url::parse("https://example.com/").unwrap(),
        output,
        format,
        geo_db: db.to_path_buf(),
        capture: CaptureOptions {
            timeout: Duration::from_secs(5),
            quiescence: Duration::from_secs(1),
        },
        origin: OriginPolicy::Fixed(GeoCoordinate::new(51.5072, -0.1276).unwrap()),
        fallback_origin: GeoCoordinate::new(0.0, 0.0).unwrap(),
        show_progress: false,
    }
}

fn hit(host: &str, ip: &str, bytes: u64) -> ScriptStep {
    ScriptStep::new(
        Duration::from_millis(100),
        SessionEvent::Request(RequestEvent::completed(
            format!("https://{}/", host),
            host.to_string(),
            Some(ip.parse().unwrap()),
            bytes,
        )),
    )
}

fn load_complete() -> ScriptStep {
    ScriptStep::new(Duration::from_millis(10), SessionEvent::LoadComplete)
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_settled_run_writes_html() {
    let (dir, db) = workspace();
    let output = dir.path().join("footprint-example.com.html");
    let browser = ScriptedBrowser::new(vec![
        hit("example.com", "93.184.216.34", 1_500),
        hit("dns.google", "8.8.8.8", 300),
        ScriptStep::new(Duration::from_millis(50), SessionEvent::LoadComplete),
    ])
    .with_hold_open(true);

    let report = execute_run(options(&db, output.clone(), ArtifactFormat::Html), &browser)
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Quiescent);
    assert!(!report.is_partial());
    assert_eq!(report.arcs.len(), 2);
    assert_eq!(report.geo_database, "IP2Location");

    let html = fs::read_to_string(&output).unwrap();
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains(r#""host_label":"example.com""#));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_with_requests_still_produces_artifact() {
    let (dir, db) = workspace();
    let output = dir.path().join("partial.json");
    let browser = ScriptedBrowser::new(vec![
        hit("example.com", "93.184.216.34", 1_500),
        hit("dns.google", "8.8.8.8", 300),
        hit("one.one.one.one", "1.1.1.1", 700),
    ])
    .with_hold_open(true);

    let report = execute_run(options(&db, output.clone(), ArtifactFormat::Json), &browser)
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::TimedOut);
    assert!(report.is_partial());
    assert_eq!(report.summary.total_requests, 3);
    assert!(output.exists());

    let payload: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(payload["summary"]["partial"], serde_json::Value::Bool(true));
    assert_eq!(payload["meta"]["termination"], "timed out");
    assert_eq!(payload["arcs"].as_array().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_report_text() {
    let (dir, db) = workspace();
    let output = dir.path().join("out.html");
    let browser = ScriptedBrowser::new(vec![
        hit("example.com", "93.184.216.34", 2_048),
        hit("intranet.local", "10.0.0.5", 100),
        load_complete(),
    ]);

    let report = execute_run(options(&db, output, ArtifactFormat::Html), &browser)
        .await
        .unwrap();
    let text = generate_run_report(&report);

    assert!(text.contains("FOOTPRINT RUN"));
    assert!(text.contains("Target:       https://example.com/"));
    assert!(text.contains("10.0.0.5"));
    assert!(text.contains("2.0 KiB"));
    assert!(!text.contains("PARTIAL"));
}

// ============================================================================
// Fatal errors
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_geo_database_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.html");
    let browser = ScriptedBrowser::default();

    let result = execute_run(
        options(&dir.path().join("nope.csv"), output.clone(), ArtifactFormat::Html),
        &browser,
    )
    .await;

    assert!(matches!(result, Err(RunError::GeoDatabase(GeoDbError::NotFound(_)))));
    assert!(!output.exists());
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_writes_nothing() {
    let (dir, db) = workspace();
    let output = dir.path().join("out.html");
    let browser = ScriptedBrowser::new(vec![ScriptStep::new(
        Duration::from_millis(20),
        SessionEvent::LoadFailed("dns error".to_string()),
    )]);

    let result = execute_run(options(&db, output.clone(), ArtifactFormat::Html), &browser).await;

    assert!(matches!(result, Err(RunError::Capture(CaptureError::LoadFailure(_)))));
    assert!(!output.exists());
}

#[tokio::test(start_paused = true)]
async fn test_silent_page_times_out() {
    let (dir, db) = workspace();
    let output = dir.path().join("out.html");
    let browser = ScriptedBrowser::default().with_hold_open(true);

    let result = execute_run(options(&db, output.clone(), ArtifactFormat::Html), &browser).await;

    assert!(matches!(result, Err(RunError::Capture(CaptureError::LoadTimeout { .. }))));
    assert!(!output.exists());
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_output_is_fatal() {
    let (dir, db) = workspace();
    let output = dir.path().join("no-such-dir").join("out.html");
    let browser = ScriptedBrowser::new(vec![
        hit("example.com", "93.184.216.34", 10),
        load_complete(),
    ]);

    let result = execute_run(options(&db, output.clone(), ArtifactFormat::Html), &browser).await;

    assert!(matches!(result, Err(RunError::Emit(_))));
    assert!(!output.exists());
}
