// One end-to-end run: capture, place, build, emit

use crate::artifact::{ArtifactFormat, ArtifactMeta, EmitError, emit};
use crate::geo::{CacheStats, GeoCoordinate, GeoDbError, GeoResolver};
use crate::origin::{Origin, OriginPolicy, resolve_origin};
use crate::scene::{ArcRecord, RunSummary, SceneBuilder};
use footprint_capture::{
    Browser, CaptureError, CaptureOptions, CaptureProgressCallback, Capturer, CapturedRequest,
    Termination,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Options for a single mapping run
pub struct RunOptions {
    pub target: Url,
    pub output: PathBuf,
    pub format: ArtifactFormat,
    pub geo_db: PathBuf,
    pub capture: CaptureOptions,
    pub origin: OriginPolicy,
    pub fallback_origin: GeoCoordinate,
    pub show_progress: bool,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    GeoDatabase(#[from] GeoDbError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: String,
    pub output: PathBuf,
    pub format: ArtifactFormat,
    pub origin: Origin,
    pub termination: Termination,
    pub elapsed: Duration,
    pub geo_database: String,
    pub cache: CacheStats,
    pub summary: RunSummary,
    pub arcs: Vec<ArcRecord>,
}

impl RunReport {
    pub fn is_partial(&self) -> bool {
        self.summary.partial
    }
}

fn new_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Execute a run with the given options.
/// The artifact is written only if capture yields at least a partial log.
pub async fn execute_run(options: RunOptions, browser: &dyn Browser) -> Result<RunReport, RunError> {
    let progress_bar = options.show_progress.then(new_spinner);
    let result = run_stages(options, browser, progress_bar.as_ref()).await;
    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }
    result
}

async fn run_stages(
    options: RunOptions,
    browser: &dyn Browser,
    progress_bar: Option<&ProgressBar>,
) -> Result<RunReport, RunError> {
    let RunOptions {
        target,
        output,
        format,
        geo_db,
        capture,
        origin,
        fallback_origin,
        ..
    } = options;

    let set_message = |msg: String| {
        if let Some(pb) = progress_bar {
            pb.set_message(msg);
        }
    };

    // fail on a missing database before spending time on the page
    set_message(format!("Opening geo database {}", geo_db.display()));
    let mut resolver = GeoResolver::open(&geo_db)?;

    set_message("Locating origin...".to_string());
    let origin = resolve_origin(&origin, &mut resolver, fallback_origin).await;

    set_message(format!("Loading {}", target));
    let mut capturer = Capturer::new(capture);
    if let Some(pb) = progress_bar {
        let pb = pb.clone();
        let count = Arc::new(AtomicUsize::new(0));
        let callback: CaptureProgressCallback = Arc::new(move |request: &CapturedRequest| {
            let seen = count.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("Capturing... {} requests ({})", seen, request.host));
        });
        capturer = capturer.with_progress_callback(callback);
    }
    let outcome = capturer.capture(browser, &target).await?;
    if outcome.is_partial() {
        warn!(
            "Capture of {} timed out; mapping the {} requests seen so far",
            target,
            outcome.requests.len()
        );
    }

    set_message(format!("Placing {} requests", outcome.requests.len()));
    let mut scene = SceneBuilder::new().build(&outcome.requests, origin.coordinate, &mut resolver);
    scene.summary.partial = outcome.is_partial();

    let meta = ArtifactMeta::new(
        target.as_str(),
        outcome.termination.as_str(),
        resolver.database_name(),
    );
    set_message(format!("Writing {}", output.display()));
    emit(&scene, origin.coordinate, &meta, &output, format)?;

    let cache = resolver.stats();
    info!(
        "Run complete: {} arcs, {} lookups ({} cached)",
        scene.arcs.len(),
        cache.lookups,
        cache.hits
    );

    Ok(RunReport {
        target: target.to_string(),
        output,
        format,
        origin,
        termination: outcome.termination,
        elapsed: outcome.elapsed,
        geo_database: resolver.database_name().to_string(),
        cache,
        summary: scene.summary,
        arcs: scene.arcs,
    })
}
