// MaxMind GeoLite2 / GeoIP2 City backend

use super::{GeoCoordinate, GeoDatabase, GeoDbError};
use maxminddb::{Reader, geoip2};
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

pub struct MaxMindDatabase {
    reader: Reader<Vec<u8>>,
    name: String,
}

impl MaxMindDatabase {
    pub fn open(path: &Path) -> Result<Self, GeoDbError> {
        if !path.exists() {
            return Err(GeoDbError::NotFound(path.to_path_buf()));
        }

        let reader =
            Reader::open_readfile(path).map_err(|e| GeoDbError::MaxMind(e.to_string()))?;
        let name = reader.metadata.database_type.clone();
        info!("Opened MaxMind database {} at {}", name, path.display());

        Ok(Self { reader, name })
    }
}

impl GeoDatabase for MaxMindDatabase {
    fn locate(&self, ip: IpAddr) -> Option<GeoCoordinate> {
        let city: geoip2::City = self.reader.lookup(ip).ok()?;
        let location = city.location?;
        GeoCoordinate::new(location.latitude?, location.longitude?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
