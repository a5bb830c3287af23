// Artifact emission: the scene written as one self-contained file

use crate::geo::GeoCoordinate;
use crate::scene::{ArcRecord, RunSummary, Scene};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

const GLOBE_SHELL: &str = include_str!("../assets/globe.html");
const PAYLOAD_PLACEHOLDER: &str = "/*__FOOTPRINT_PAYLOAD__*/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactFormat {
    Html,
    Json,
}

impl ArtifactFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "html" | "htm" => Some(ArtifactFormat::Html),
            "json" => Some(ArtifactFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Html => "html",
            ArtifactFormat::Json => "json",
        }
    }
}

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize scene: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Facts about the run shown alongside the globe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub run_id: String,
    pub target: String,
    pub generated_at: String,
    pub termination: String,
    pub geo_database: String,
    pub generator: String,
    pub version: String,
}

impl ArtifactMeta {
    pub fn new(
        target: impl Into<String>,
        termination: impl Into<String>,
        geo_database: impl Into<String>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            termination: termination.into(),
            geo_database: geo_database.into(),
            generator: "footprint".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    meta: &'a ArtifactMeta,
    origin: GeoCoordinate,
    summary: &'a RunSummary,
    arcs: &'a [ArcRecord],
}

/// Render the artifact body without touching the filesystem.
pub fn render(
    scene: &Scene,
    origin: GeoCoordinate,
    meta: &ArtifactMeta,
    format: ArtifactFormat,
) -> Result<String, EmitError> {
    let payload = Payload {
        meta,
        origin,
        summary: &scene.summary,
        arcs: &scene.arcs,
    };

    match format {
        ArtifactFormat::Json => Ok(serde_json::to_string_pretty(&payload)?),
        ArtifactFormat::Html => {
            let json = serde_json::to_string(&payload)?;
            Ok(GLOBE_SHELL.replacen(PAYLOAD_PLACEHOLDER, &escape_for_script(&json), 1))
        }
    }
}

/// Write the artifact to `path`. The file appears complete or not at all.
pub fn emit(
    scene: &Scene,
    origin: GeoCoordinate,
    meta: &ArtifactMeta,
    path: &Path,
    format: ArtifactFormat,
) -> Result<(), EmitError> {
    let body = render(scene, origin, meta, format)?;
    write_atomically(path, body.as_bytes())?;
    info!("Wrote {} arcs to {}", scene.arcs.len(), path.display());
    Ok(())
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), EmitError> {
    let write_err = |source: std::io::Error| EmitError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // same directory as the target so the final rename never crosses filesystems
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    debug!("Staged {} bytes in {}", contents.len(), tmp.path().display());

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Keep serialized JSON from closing the surrounding `<script>` element.
fn escape_for_script(json: &str) -> String {
    json.replace("</", "<\\/").replace("<!--", "<\\!--")
}
