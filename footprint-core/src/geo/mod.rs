//! Offline IP geolocation.
//!
//! A [`GeoResolver`] owns one read-only [`GeoDatabase`] for the duration of a
//! run and memoizes every answer it gives, so a page that pulls fifty assets
//! from one CDN edge costs a single database lookup.

pub mod ip2location;
pub mod maxmind;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub use ip2location::Ip2LocationCsv;
pub use maxmind::MaxMindDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl GeoCoordinate {
    /// `None` unless latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }

    /// Bit-exact key, for grouping by identical coordinates.
    pub fn key(&self) -> (u64, u64) {
        (self.latitude.to_bits(), self.longitude.to_bits())
    }
}

impl std::fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionFailure {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("no geo coverage for {0}")]
    NoCoverage(IpAddr),
}

#[derive(Error, Debug)]
pub enum GeoDbError {
    #[error("geo database not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("geo database line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("MaxMind database error: {0}")]
    MaxMind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A read-only IP-range to location index.
pub trait GeoDatabase: Send + Sync {
    fn locate(&self, ip: IpAddr) -> Option<GeoCoordinate>;

    fn name(&self) -> &str;
}

/// Open a database file, picking the backend from its extension.
pub fn open_database(path: &Path) -> Result<Box<dyn GeoDatabase>, GeoDbError> {
    if !path.exists() {
        return Err(GeoDbError::NotFound(path.to_path_buf()));
    }

    let is_mmdb = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mmdb"))
        .unwrap_or(false);

    if is_mmdb {
        Ok(Box::new(MaxMindDatabase::open(path)?))
    } else {
        Ok(Box::new(Ip2LocationCsv::open(path)?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub lookups: usize,
    pub hits: usize,
    pub entries: usize,
}

pub struct GeoResolver {
    database: Box<dyn GeoDatabase>,
    cache: HashMap<IpAddr, Result<GeoCoordinate, ResolutionFailure>>,
    lookups: usize,
    hits: usize,
}

impl GeoResolver {
    pub fn new(database: Box<dyn GeoDatabase>) -> Self {
        Self {
            database,
            cache: HashMap::new(),
            lookups: 0,
            hits: 0,
        }
    }

    pub fn open(path: &Path) -> Result<Self, GeoDbError> {
        let database = open_database(path)?;
        debug!("Opened {} geo database at {}", database.name(), path.display());
        Ok(Self::new(database))
    }

    pub fn resolve(&mut self, ip: &str) -> Result<GeoCoordinate, ResolutionFailure> {
        let addr = ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ResolutionFailure::InvalidAddress(ip.to_string()))?;
        self.resolve_addr(addr)
    }

    pub fn resolve_addr(&mut self, ip: IpAddr) -> Result<GeoCoordinate, ResolutionFailure> {
        self.lookups += 1;
        if let Some(cached) = self.cache.get(&ip) {
            self.hits += 1;
            return cached.clone();
        }

        let result = if is_reserved(ip) {
            Err(ResolutionFailure::NoCoverage(ip))
        } else {
            self.database
                .locate(ip)
                .ok_or(ResolutionFailure::NoCoverage(ip))
        };
        debug!("Resolved {} -> {:?}", ip, result);

        self.cache.insert(ip, result.clone());
        result
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups,
            hits: self.hits,
            entries: self.cache.len(),
        }
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }
}

/// Addresses no geo database can place: private, loopback, link-local,
/// shared, documentation, multicast and otherwise reserved ranges.
pub fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_reserved_v4(v4),
            None => is_reserved_v6(v6),
        },
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    a == 0
        || a == 10
        || a == 127
        || a >= 224
        || (a == 100 && (b & 0xc0) == 64)
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || (a == 192 && b == 0 && (c == 0 || c == 2))
        || (a == 198 && (b == 18 || b == 19))
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();

    ip.is_unspecified()
        || ip.is_loopback()
        || (segments[0] & 0xff00) == 0xff00
        || (segments[0] & 0xfe00) == 0xfc00
        || (segments[0] & 0xffc0) == 0xfe80
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
}
