// Tests for argument parsing and run option assembly

use clap::{Arg, Command};
use footprint::handlers::*;
use footprint_core::artifact::ArtifactFormat;
use footprint_core::origin::OriginPolicy;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[test]
fn test_parse_target_url_with_scheme() {
    let url = parse_target_url("https://example.com/news").unwrap();
    assert_eq!(url.as_str(), "https://example.com/news");
}

#[test]
fn test_parse_target_url_without_scheme() {
    let url = parse_target_url("example.com").unwrap();
    assert_eq!(url.as_str(), "https://example.com/");

    let url = parse_target_url("localhost:8080/app").unwrap();
    assert_eq!(url.as_str(), "https://localhost:8080/app");
}

#[test]
fn test_parse_target_url_rejects_other_schemes() {
    assert!(parse_target_url("ftp://example.com/file").is_err());
    assert!(parse_target_url("").is_err());
    assert!(parse_target_url("not a valid url!!!").is_err());
}

#[test]
fn test_parse_coordinate() {
    let c = parse_coordinate("51.5072, -0.1276").unwrap();
    assert_eq!(c.latitude, 51.5072);
    assert_eq!(c.longitude, -0.1276);

    assert!(parse_coordinate("51.5").is_err());
    assert!(parse_coordinate("north,west").is_err());
    assert!(parse_coordinate("91,0").is_err());
}

#[test]
fn test_parse_seconds() {
    assert_eq!(parse_seconds("30").unwrap(), Duration::from_secs(30));
    assert_eq!(parse_seconds("0.5").unwrap(), Duration::from_millis(500));
    assert!(parse_seconds("0").is_err());
    assert!(parse_seconds("-3").is_err());
    assert!(parse_seconds("soon").is_err());
}

#[test]
fn test_default_output_path() {
    let url = Url::parse("https://www.example.com/a/b").unwrap();
    assert_eq!(
        default_output_path(&url, ArtifactFormat::Html),
        PathBuf::from("footprint-www.example.com.html")
    );

    let v6 = Url::parse("http://[2606:4700::1]:8080/").unwrap();
    assert_eq!(
        default_output_path(&v6, ArtifactFormat::Json),
        PathBuf::from("footprint-_2606_4700__1_.json")
    );
}

// ============================================================================
// Run options from parsed flags
// ============================================================================

fn run_command() -> Command {
    Command::new("test")
        .arg(Arg::new("output").long("output"))
        .arg(Arg::new("format").long("format").default_value("html"))
        .arg(Arg::new("timeout").long("timeout").value_parser(parse_seconds))
        .arg(Arg::new("quiescence").long("quiescence").value_parser(parse_seconds))
        .arg(Arg::new("geo-db").long("geo-db"))
        .arg(
            Arg::new("origin-ip")
                .long("origin-ip")
                .value_parser(clap::value_parser!(std::net::IpAddr)),
        )
        .arg(
            Arg::new("origin")
                .long("origin")
                .allow_hyphen_values(true)
                .value_parser(parse_coordinate),
        )
}

#[test]
fn test_run_options_defaults() {
    let matches = run_command().get_matches_from(["test"]);
    let target = Url::parse("https://example.com/").unwrap();
    let options = run_options_from_args(&matches, target, true).unwrap();

    assert_eq!(options.format, ArtifactFormat::Html);
    assert_eq!(options.output, PathBuf::from("footprint-example.com.html"));
    assert_eq!(options.capture.timeout, Duration::from_secs(30));
    assert!(options.geo_db.ends_with("IP2LOCATION-LITE-DB5.CSV"));
    assert!(matches!(options.origin, OriginPolicy::PublicIp { .. }));
    assert!(!options.show_progress);
}

#[test]
fn test_run_options_overrides() {
    let matches = run_command().get_matches_from([
        "test",
        "--output",
        "/tmp/map.json",
        "--format",
        "json",
        "--timeout",
        "12",
        "--quiescence",
        "0.5",
        "--geo-db",
        "/data/GeoLite2-City.mmdb",
        "--origin",
        "-33.8678,151.2073",
    ]);
    let target = Url::parse("https://example.com/").unwrap();
    let options = run_options_from_args(&matches, target, false).unwrap();

    assert_eq!(options.format, ArtifactFormat::Json);
    assert_eq!(options.output, PathBuf::from("/tmp/map.json"));
    assert_eq!(options.capture.timeout, Duration::from_secs(12));
    assert_eq!(options.capture.quiescence, Duration::from_millis(500));
    assert_eq!(options.geo_db, PathBuf::from("/data/GeoLite2-City.mmdb"));
    match options.origin {
        OriginPolicy::Fixed(c) => assert_eq!(c.latitude, -33.8678),
        other => panic!("expected fixed origin, got {:?}", other),
    }
    assert!(options.show_progress);
}

#[test]
fn test_run_options_origin_ip() {
    let matches = run_command().get_matches_from(["test", "--origin-ip", "8.8.8.8"]);
    let target = Url::parse("https://example.com/").unwrap();
    let options = run_options_from_args(&matches, target, true).unwrap();

    assert_eq!(options.origin, OriginPolicy::Ip("8.8.8.8".parse().unwrap()));
}
