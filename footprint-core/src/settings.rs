// Run defaults and filesystem locations

use crate::geo::GeoCoordinate;
use crate::origin::{NULL_ISLAND, OriginPolicy};
use footprint_capture::capture::{DEFAULT_QUIESCENCE, DEFAULT_TIMEOUT};
use footprint_capture::fetcher::DEFAULT_CONCURRENCY;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/footprint";
pub const DEFAULT_GEO_DB_NAME: &str = "IP2LOCATION-LITE-DB5.CSV";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub geo_db: PathBuf,
    pub timeout: Duration,
    pub quiescence: Duration,
    pub concurrency: usize,
    pub origin: OriginPolicy,
    pub fallback_origin: GeoCoordinate,
}

impl Settings {
    /// Settings rooted at `config_dir`, which may start with `~`.
    pub fn with_config_dir(config_dir: &str) -> Self {
        let config_dir = expand_path(config_dir);
        let geo_db = config_dir.join(DEFAULT_GEO_DB_NAME);
        Self {
            config_dir,
            geo_db,
            timeout: DEFAULT_TIMEOUT,
            quiescence: DEFAULT_QUIESCENCE,
            concurrency: DEFAULT_CONCURRENCY,
            origin: OriginPolicy::default(),
            fallback_origin: NULL_ISLAND,
        }
    }

    pub fn geo_db_present(&self) -> bool {
        self.geo_db.is_file()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_config_dir(DEFAULT_CONFIG_DIR)
    }
}

/// Expand a leading `~` and environment variables; unknown variables are left as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(raw).into_owned());
    Path::new(&expanded).to_path_buf()
}
