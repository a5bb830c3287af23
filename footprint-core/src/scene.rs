// Scene model: turns the capture log into ordered, weighted arcs

use crate::geo::{GeoCoordinate, GeoResolver};
use footprint_capture::CapturedRequest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb(
            channel(self.0, other.0),
            channel(self.1, other.1),
            channel(self.2, other.2),
        )
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Color ramp from the first arc drawn to the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gradient {
    pub earliest: Rgb,
    pub latest: Rgb,
}

impl Gradient {
    pub fn at(&self, weight: f64) -> Rgb {
        self.earliest.lerp(self.latest, weight)
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            earliest: Rgb(0xff, 0x2d, 0x2d),
            latest: Rgb(0x2d, 0x7d, 0xff),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcRecord {
    pub origin: GeoCoordinate,
    pub destination: GeoCoordinate,
    /// 0 for the earliest destination, 1 for the latest.
    pub color_weight: f64,
    pub color: String,
    pub thickness_weight: f64,
    pub host_label: String,
    pub total_bytes: u64,
    pub effective_sequence: u64,
    pub request_count: usize,
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_requests: usize,
    /// Requests that never reached a server.
    pub failed_requests: usize,
    /// Requests left out of the scene: failed ones plus those whose address
    /// could not be placed.
    pub unresolved_count: usize,
    pub unresolved_addresses: Vec<IpAddr>,
    /// Destinations that resolved but transferred nothing.
    pub empty_groups: usize,
    pub arcs_rendered: usize,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub arcs: Vec<ArcRecord>,
    pub summary: RunSummary,
}

/// Arc thickness for a byte total: `ln(1 + bytes)`.
///
/// Grows without bound but slowly, so one large video does not flatten every
/// small script next to it. Positive for every positive input.
pub fn thickness_for(total_bytes: u64) -> f64 {
    (total_bytes as f64).ln_1p()
}

/// Position of `sequence` between `min` and `max`, in [0, 1].
pub fn color_weight(sequence: u64, min: u64, max: u64) -> f64 {
    if max <= min {
        return 0.0;
    }
    (sequence.saturating_sub(min)) as f64 / (max - min) as f64
}

struct AddressGroup {
    hosts: BTreeSet<String>,
    total_bytes: u64,
    min_sequence: u64,
    request_count: usize,
}

impl AddressGroup {
    fn new(first: &CapturedRequest) -> Self {
        Self {
            hosts: BTreeSet::new(),
            total_bytes: 0,
            min_sequence: first.sequence,
            request_count: 0,
        }
    }

    fn add(&mut self, request: &CapturedRequest) {
        self.hosts.insert(request.host.clone());
        self.total_bytes = self.total_bytes.saturating_add(request.bytes_transferred);
        self.min_sequence = self.min_sequence.min(request.sequence);
        self.request_count += 1;
    }
}

struct Destination {
    coordinate: GeoCoordinate,
    hosts: BTreeSet<String>,
    addresses: Vec<IpAddr>,
    total_bytes: u64,
    min_sequence: u64,
    request_count: usize,
}

impl Destination {
    fn new(coordinate: GeoCoordinate, ip: IpAddr, group: AddressGroup) -> Self {
        Self {
            coordinate,
            hosts: group.hosts,
            addresses: vec![ip],
            total_bytes: group.total_bytes,
            min_sequence: group.min_sequence,
            request_count: group.request_count,
        }
    }

    fn absorb(&mut self, ip: IpAddr, group: AddressGroup) {
        self.hosts.extend(group.hosts);
        self.addresses.push(ip);
        self.total_bytes = self.total_bytes.saturating_add(group.total_bytes);
        self.min_sequence = self.min_sequence.min(group.min_sequence);
        self.request_count += group.request_count;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneBuilder {
    gradient: Gradient,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gradient(mut self, gradient: Gradient) -> Self {
        self.gradient = gradient;
        self
    }

    /// Aggregate `log` by destination address, place each address with
    /// `resolver`, and emit one arc per distinct destination coordinate in
    /// order of first contact.
    pub fn build(
        &self,
        log: &[CapturedRequest],
        origin: GeoCoordinate,
        resolver: &mut GeoResolver,
    ) -> Scene {
        let mut summary = RunSummary {
            total_requests: log.len(),
            ..RunSummary::default()
        };

        let mut by_address: BTreeMap<IpAddr, AddressGroup> = BTreeMap::new();
        for request in log {
            match request.resolved_ip {
                Some(ip) => by_address
                    .entry(ip)
                    .or_insert_with(|| AddressGroup::new(request))
                    .add(request),
                None => {
                    summary.failed_requests += 1;
                    summary.unresolved_count += 1;
                }
            }
        }

        // addresses in one city land on the same coordinate: one arc for them all
        let mut by_coordinate: BTreeMap<(u64, u64), Destination> = BTreeMap::new();
        for (ip, group) in by_address {
            match resolver.resolve_addr(ip) {
                Ok(coordinate) => match by_coordinate.get_mut(&coordinate.key()) {
                    Some(destination) => destination.absorb(ip, group),
                    None => {
                        let destination = Destination::new(coordinate, ip, group);
                        by_coordinate.insert(coordinate.key(), destination);
                    }
                },
                Err(failure) => {
                    warn!(
                        "Dropping {} ({} requests to {}): {}",
                        ip,
                        group.request_count,
                        group.hosts.iter().cloned().collect::<Vec<_>>().join(", "),
                        failure
                    );
                    summary.unresolved_count += group.request_count;
                    summary.unresolved_addresses.push(ip);
                }
            }
        }

        let mut destinations: Vec<Destination> = Vec::with_capacity(by_coordinate.len());
        for destination in by_coordinate.into_values() {
            if destination.total_bytes == 0 {
                debug!("Skipping zero-byte destination {}", destination.coordinate);
                summary.empty_groups += 1;
            } else {
                destinations.push(destination);
            }
        }
        destinations.sort_by_key(|d| d.min_sequence);

        let min = destinations.first().map(|d| d.min_sequence).unwrap_or(0);
        let max = destinations.last().map(|d| d.min_sequence).unwrap_or(0);

        let arcs: Vec<ArcRecord> = destinations
            .into_iter()
            .map(|d| {
                let weight = color_weight(d.min_sequence, min, max);
                ArcRecord {
                    origin,
                    destination: d.coordinate,
                    color_weight: weight,
                    color: self.gradient.at(weight).to_hex(),
                    thickness_weight: thickness_for(d.total_bytes),
                    host_label: d.hosts.into_iter().collect::<Vec<_>>().join(", "),
                    total_bytes: d.total_bytes,
                    effective_sequence: d.min_sequence,
                    request_count: d.request_count,
                    addresses: d.addresses,
                }
            })
            .collect();

        summary.arcs_rendered = arcs.len();
        debug!(
            "Built {} arcs from {} requests ({} unresolved)",
            arcs.len(),
            summary.total_requests,
            summary.unresolved_count
        );

        Scene { arcs, summary }
    }
}
