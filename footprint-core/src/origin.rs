// Where arcs start: the machine running the capture

use crate::geo::{GeoCoordinate, GeoResolver, ResolutionFailure};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_ECHO_ENDPOINT: &str = "https://api.ipify.org";
const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// Origin used when nothing better is known.
pub const NULL_ISLAND: GeoCoordinate = GeoCoordinate {
    latitude: 0.0,
    longitude: 0.0,
};

#[derive(Debug, Clone, PartialEq)]
pub enum OriginPolicy {
    /// Ask a plain-text echo service for our public address and place it.
    PublicIp { endpoint: String },
    /// Place a known address.
    Ip(IpAddr),
    Fixed(GeoCoordinate),
}

impl Default for OriginPolicy {
    fn default() -> Self {
        OriginPolicy::PublicIp {
            endpoint: DEFAULT_ECHO_ENDPOINT.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("public IP lookup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("echo service returned '{0}', not an IP address")]
    BadResponse(String),

    #[error(transparent)]
    Unresolvable(#[from] ResolutionFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub coordinate: GeoCoordinate,
    pub address: Option<IpAddr>,
    /// True when the policy failed and `coordinate` is the fallback.
    pub fell_back: bool,
}

pub async fn fetch_public_ip(endpoint: &str) -> Result<IpAddr, OriginError> {
    let client = reqwest::Client::builder().timeout(ECHO_TIMEOUT).build()?;
    let body = client
        .get(endpoint)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let trimmed = body.trim();
    trimmed
        .parse::<IpAddr>()
        .map_err(|_| OriginError::BadResponse(trimmed.chars().take(64).collect()))
}

async fn try_resolve(
    policy: &OriginPolicy,
    resolver: &mut GeoResolver,
) -> Result<(GeoCoordinate, Option<IpAddr>), OriginError> {
    match policy {
        OriginPolicy::Fixed(coordinate) => Ok((*coordinate, None)),
        OriginPolicy::Ip(ip) => Ok((resolver.resolve_addr(*ip)?, Some(*ip))),
        OriginPolicy::PublicIp { endpoint } => {
            let ip = fetch_public_ip(endpoint).await?;
            debug!("Public address is {}", ip);
            Ok((resolver.resolve_addr(ip)?, Some(ip)))
        }
    }
}

/// Place the origin. Never fails: any problem yields `fallback` and a warning.
pub async fn resolve_origin(
    policy: &OriginPolicy,
    resolver: &mut GeoResolver,
    fallback: GeoCoordinate,
) -> Origin {
    match try_resolve(policy, resolver).await {
        Ok((coordinate, address)) => {
            info!("Origin placed at {}", coordinate);
            Origin {
                coordinate,
                address,
                fell_back: false,
            }
        }
        Err(e) => {
            warn!("Could not place origin ({}), using {}", e, fallback);
            Origin {
                coordinate: fallback,
                address: None,
                fell_back: true,
            }
        }
    }
}
