use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use footprint_capture::{Browser, CaptureOptions, FetchBrowser, FetchOptions, HarReplay};
use footprint_core::artifact::ArtifactFormat;
use footprint_core::geo::GeoCoordinate;
use footprint_core::origin::OriginPolicy;
use footprint_core::pipeline::{RunOptions, RunReport, execute_run};
use footprint_core::settings::{Settings, expand_path};
use footprint_core::summary::generate_run_report;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use url::Url;

// Helpers for argument parsing

/// Parse a target as a URL, adding https:// when no scheme is given
pub fn parse_target_url(input: &str) -> Result<Url, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty URL".to_string());
    }

    let parsed = match Url::parse(input) {
        Ok(url) if url.has_host() => url,
        _ => Url::parse(&format!("https://{}", input))
            .map_err(|e| format!("'{}' is not a valid URL: {}", input, e))?,
    };

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(format!("unsupported scheme '{}', use http or https", other)),
    }
}

/// Parse "LAT,LON" into a coordinate
pub fn parse_coordinate(input: &str) -> Result<GeoCoordinate, String> {
    let (lat, lon) = input
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON but got '{}'", input))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("bad latitude '{}'", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("bad longitude '{}'", lon.trim()))?;
    GeoCoordinate::new(lat, lon).ok_or_else(|| format!("{}, {} is off the globe", lat, lon))
}

/// Parse a duration given in (possibly fractional) seconds
pub fn parse_seconds(input: &str) -> Result<Duration, String> {
    let secs: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", input))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

/// `footprint-<host>.<ext>` in the current directory
pub fn default_output_path(target: &Url, format: ArtifactFormat) -> PathBuf {
    let host = target.host_str().unwrap_or("page");
    let safe: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    PathBuf::from(format!("footprint-{}.{}", safe, format.extension()))
}

pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // logs go to stderr so the run summary on stdout stays clean
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Build run options from the flags shared by `map` and `replay`
pub fn run_options_from_args(args: &ArgMatches, target: Url, quiet: bool) -> Result<RunOptions> {
    let mut settings = Settings::default();

    if let Some(db) = args.get_one::<String>("geo-db") {
        settings.geo_db = expand_path(db);
    }
    if let Some(timeout) = args.get_one::<Duration>("timeout") {
        settings.timeout = *timeout;
    }
    if let Some(quiescence) = args.get_one::<Duration>("quiescence") {
        settings.quiescence = *quiescence;
    }
    if let Some(ip) = args.get_one::<IpAddr>("origin-ip") {
        settings.origin = OriginPolicy::Ip(*ip);
    } else if let Some(coordinate) = args.get_one::<GeoCoordinate>("origin") {
        settings.origin = OriginPolicy::Fixed(*coordinate);
    }

    let format_name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("html");
    let format = ArtifactFormat::from_str(format_name)
        .ok_or_else(|| anyhow!("unknown output format '{}'", format_name))?;

    let output = match args.get_one::<String>("output") {
        Some(path) => expand_path(path),
        None => default_output_path(&target, format),
    };

    Ok(RunOptions {
        target,
        output,
        format,
        geo_db: settings.geo_db,
        capture: CaptureOptions {
            timeout: settings.timeout,
            quiescence: settings.quiescence,
        },
        origin: settings.origin,
        fallback_origin: settings.fallback_origin,
        show_progress: !quiet,
    })
}

fn print_run_header(options: &RunOptions, source: &str) {
    println!(
        "{} Target: {}",
        "→".blue(),
        options.target.as_str().bright_white()
    );
    println!("{} Source: {}", "→".blue(), source);
    println!(
        "{} Geo database: {}",
        "→".blue(),
        options.geo_db.display().to_string().bright_white()
    );
    println!(
        "{} Timeout: {:.1}s, quiescence: {:.1}s",
        "→".blue(),
        options.capture.timeout.as_secs_f64(),
        options.capture.quiescence.as_secs_f64()
    );
    println!();
}

fn print_run_outcome(report: &RunReport) {
    print!("{}", generate_run_report(report));

    if report.is_partial() {
        println!(
            "{} Capture timed out; the map shows only the {} requests seen",
            "⚠".yellow().bold(),
            report.summary.total_requests
        );
    }
    if report.summary.unresolved_count > 0 {
        println!(
            "{} {} requests could not be placed on the globe",
            "⚠".yellow().bold(),
            report.summary.unresolved_count
        );
    }
    if report.origin.fell_back {
        println!(
            "{} Origin unknown, arcs start at {}",
            "⚠".yellow().bold(),
            report.origin.coordinate
        );
    }
    println!(
        "{} Wrote {}",
        "✓".green().bold(),
        report.output.display().to_string().bright_white()
    );
}

async fn run_with(
    browser: &dyn Browser,
    options: RunOptions,
    source: &str,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        print_run_header(&options, source);
    }
    let report = execute_run(options, browser).await?;
    print_run_outcome(&report);
    Ok(())
}

pub async fn handle_map(args: &ArgMatches, quiet: bool) -> Result<()> {
    let target = args
        .get_one::<Url>("URL")
        .cloned()
        .ok_or_else(|| anyhow!("a URL is required"))?;
    let concurrency = args.get_one::<usize>("concurrency").copied();

    let options = run_options_from_args(args, target, quiet)?;
    let mut fetch_options = FetchOptions::default();
    if let Some(concurrency) = concurrency {
        fetch_options.max_concurrency = concurrency;
    }
    let browser =
        FetchBrowser::with_options(fetch_options).context("failed to build HTTP client")?;

    run_with(&browser, options, "live page load", quiet).await
}

pub async fn handle_replay(args: &ArgMatches, quiet: bool) -> Result<()> {
    let har_path = args
        .get_one::<PathBuf>("HAR")
        .ok_or_else(|| anyhow!("a HAR file is required"))?;
    let replay = HarReplay::from_path(har_path)
        .with_context(|| format!("failed to read HAR file {}", har_path.display()))?
        .with_pacing(args.get_flag("paced"));

    let target = match args.get_one::<Url>("url") {
        Some(url) => url.clone(),
        None => {
            let first = replay
                .page_url()
                .ok_or_else(|| anyhow!("HAR file has no entries; pass --url to name the page"))?;
            parse_target_url(first).map_err(|e| anyhow!(e))?
        }
    };

    let options = run_options_from_args(args, target, quiet)?;
    let source = format!("{} ({} entries)", har_path.display(), replay.len());
    run_with(&replay, options, &source, quiet).await
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    let raw_dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or(footprint_core::settings::DEFAULT_CONFIG_DIR);
    let settings = Settings::with_config_dir(raw_dir);

    print_divider();
    println!("{}", "  FOOTPRINT INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    create_config_dir(&settings.config_dir)?;

    println!();
    if settings.geo_db_present() {
        println!(
            "{} Geo database: {}",
            "✓".green().bold(),
            settings.geo_db.display().to_string().bright_white()
        );
    } else {
        println!("{}", "⚠ GEO DATABASE MISSING".yellow().bold());
        println!("footprint places addresses with the IP2Location LITE DB5 database.");
        println!(
            "{} Download IP2LOCATION-LITE-DB5.CSV from https://lite.ip2location.com",
            "→".blue()
        );
        println!(
            "{} Save it as: {}",
            "→".blue(),
            settings.geo_db.display().to_string().bright_white()
        );
        println!(
            "{} Or point --geo-db / FOOTPRINT_GEO_DB at a GeoLite2-City.mmdb file",
            "ℹ".blue()
        );
    }
    println!(
        "{} HTML maps carry their data inline but load globe.gl and the earth texture from unpkg.com",
        "ℹ".blue()
    );
    println!();
    Ok(())
}

fn create_config_dir(config_dir: &Path) -> Result<()> {
    if config_dir.is_dir() {
        println!(
            "{} Config directory exists: {}",
            "✓".green().bold(),
            config_dir.display().to_string().bright_white()
        );
        return Ok(());
    }
    if config_dir.exists() {
        bail!("{} exists and is not a directory", config_dir.display());
    }

    println!("{} Creating config directory...", "→".blue());
    fs::create_dir_all(config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    println!(
        "  {} {}",
        "✓".green(),
        config_dir.display().to_string().bright_white()
    );
    Ok(())
}
