// IP2Location LITE DB5 CSV backend.
//
// Rows look like:
//   "16777216","16777471","US","United States of America","California","Los Angeles","34.052230","-118.243680"
// The IPv6 edition uses the same layout with 128-bit numbers and keeps IPv4
// space at ::ffff:0:0/96. Rows without coverage carry "-" and 0/0.

use super::{GeoCoordinate, GeoDatabase, GeoDbError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

const IPV4_MAPPED_BASE: u128 = 0xffff_0000_0000;

#[derive(Debug, Clone)]
struct IpRange {
    from: u128,
    to: u128,
    location: Option<GeoCoordinate>,
}

pub struct Ip2LocationCsv {
    ranges: Vec<IpRange>,
    ipv6: bool,
}

impl Ip2LocationCsv {
    pub fn open(path: &Path) -> Result<Self, GeoDbError> {
        info!("Loading geolocation database from {}", path.display());
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GeoDbError::NotFound(path.to_path_buf()),
            _ => GeoDbError::Io(e),
        })?;
        let db = Self::from_reader(BufReader::new(file))?;
        info!("Geolocation database loaded: {} ranges", db.len());
        Ok(db)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, GeoDbError> {
        let mut ranges = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            ranges.push(parse_row(&line, line_no)?);
        }

        ranges.sort_by_key(|range| range.from);
        let ipv6 = ranges.iter().any(|range| range.to > u32::MAX as u128);

        Ok(Self { ranges, ipv6 })
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    fn find(&self, key: u128) -> Option<&IpRange> {
        let idx = self.ranges.partition_point(|range| range.from <= key);
        if idx == 0 {
            return None;
        }
        let range = &self.ranges[idx - 1];
        (key <= range.to).then_some(range)
    }

    fn key_for(&self, ip: IpAddr) -> Option<u128> {
        match ip {
            IpAddr::V4(v4) => {
                let n = u32::from(v4) as u128;
                Some(if self.ipv6 { IPV4_MAPPED_BASE | n } else { n })
            }
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.key_for(IpAddr::V4(v4)),
                // an IPv4-only table has nothing for native IPv6
                None if !self.ipv6 => None,
                None => Some(u128::from(v6)),
            },
        }
    }
}

impl GeoDatabase for Ip2LocationCsv {
    fn locate(&self, ip: IpAddr) -> Option<GeoCoordinate> {
        let key = self.key_for(ip)?;
        self.find(key).and_then(|range| range.location)
    }

    fn name(&self) -> &str {
        if self.ipv6 {
            "IP2Location (IPv6)"
        } else {
            "IP2Location"
        }
    }
}

fn parse_row(line: &str, line_no: usize) -> Result<IpRange, GeoDbError> {
    let fields = split_csv_line(line);
    let err = |reason: String| GeoDbError::Parse {
        line: line_no,
        reason,
    };

    if fields.len() < 8 {
        return Err(err(format!("expected 8 fields, found {}", fields.len())));
    }

    let from = fields[0]
        .parse::<u128>()
        .map_err(|_| err(format!("bad ip_from '{}'", fields[0])))?;
    let to = fields[1]
        .parse::<u128>()
        .map_err(|_| err(format!("bad ip_to '{}'", fields[1])))?;
    if to < from {
        return Err(err(format!("range {}-{} is reversed", from, to)));
    }

    let latitude = fields[6]
        .parse::<f64>()
        .map_err(|_| err(format!("bad latitude '{}'", fields[6])))?;
    let longitude = fields[7]
        .parse::<f64>()
        .map_err(|_| err(format!("bad longitude '{}'", fields[7])))?;

    let location = if fields[2] == "-" {
        None
    } else {
        Some(
            GeoCoordinate::new(latitude, longitude)
                .ok_or_else(|| err(format!("coordinate {}, {} out of range", latitude, longitude)))?,
        )
    };

    Ok(IpRange { from, to, location })
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
