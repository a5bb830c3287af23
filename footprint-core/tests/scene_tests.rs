// Tests for turning a capture log into arcs

use footprint_capture::{CapturedRequest, RequestEvent};
use footprint_core::geo::{GeoCoordinate, GeoResolver, Ip2LocationCsv};
use footprint_core::scene::{SceneBuilder, thickness_for};
use std::io::Cursor;
use std::net::IpAddr;
use std::time::Duration;

// 93.184.216.0/24 Norwell, 8.8.8.0/24 Mountain View, 1.1.1.0/24 and
// 151.101.1.0/24 both Sydney
const GEO_CSV: &str = r#""0","16777215","-","-","-","-","0.000000","0.000000"
"16843008","16843263","AU","Australia","New South Wales","Sydney","-33.867850","151.207320"
"134744064","134744319","US","United States of America","California","Mountain View","37.405992","-122.078515"
"1572395008","1572395263","US","United States of America","Massachusetts","Norwell","42.157500","-70.821800"
"2539979008","2539979263","AU","Australia","New South Wales","Sydney","-33.867850","151.207320"
"#;

fn resolver() -> GeoResolver {
    let db = Ip2LocationCsv::from_reader(Cursor::new(GEO_CSV)).unwrap();
    GeoResolver::new(Box::new(db))
}

fn origin() -> GeoCoordinate {
    GeoCoordinate::new(51.5072, -0.1276).unwrap()
}

fn request(ip: Option<&str>, bytes: u64, sequence: u64) -> CapturedRequest {
    let host = ip.map(|ip| format!("host-{}", ip)).unwrap_or_else(|| "dead.example".to_string());
    let event = match ip {
        Some(ip) => RequestEvent::completed(
            format!("https://{}/", host),
            host,
            Some(ip.parse::<IpAddr>().unwrap()),
            bytes,
        ),
        None => RequestEvent::failed(
            format!("https://{}/", host),
            host,
            "net::ERR_CONNECTION_REFUSED".to_string(),
        ),
    };
    CapturedRequest::from_event(event, sequence, Duration::from_millis(sequence * 10))
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_shared_ip_scenario() {
    let log = vec![
        request(Some("93.184.216.34"), 500, 0),
        request(Some("8.8.8.8"), 200, 1),
        request(Some("93.184.216.34"), 1500, 3),
    ];
    let mut resolver = resolver();
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver);

    assert_eq!(scene.arcs.len(), 2);

    let first = &scene.arcs[0];
    assert_eq!(first.addresses, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    assert_eq!(first.total_bytes, 2000);
    assert_eq!(first.effective_sequence, 0);
    assert_eq!(first.color_weight, 0.0);
    assert_eq!(first.request_count, 2);

    let second = &scene.arcs[1];
    assert_eq!(second.addresses, vec!["8.8.8.8".parse::<IpAddr>().unwrap()]);
    assert_eq!(second.total_bytes, 200);
    assert_eq!(second.effective_sequence, 1);
    assert_eq!(second.color_weight, 1.0);

    assert_eq!(scene.summary.total_requests, 3);
    assert_eq!(scene.summary.unresolved_count, 0);
    assert_eq!(scene.summary.arcs_rendered, 2);
}

#[test]
fn test_every_arc_starts_at_origin() {
    let log = vec![
        request(Some("93.184.216.34"), 10, 0),
        request(Some("8.8.8.8"), 20, 1),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());
    assert!(scene.arcs.iter().all(|arc| arc.origin == origin()));
}

#[test]
fn test_addresses_in_same_city_share_an_arc() {
    let log = vec![
        request(Some("1.1.1.1"), 100, 2),
        request(Some("151.101.1.69"), 300, 0),
        request(Some("8.8.8.8"), 50, 1),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    assert_eq!(scene.arcs.len(), 2);
    let sydney = &scene.arcs[0];
    assert_eq!(sydney.total_bytes, 400);
    assert_eq!(sydney.effective_sequence, 0);
    assert_eq!(sydney.addresses.len(), 2);
    assert_eq!(sydney.host_label, "host-1.1.1.1, host-151.101.1.69");
}

#[test]
fn test_zero_byte_destination_is_skipped() {
    let log = vec![
        request(Some("93.184.216.34"), 0, 0),
        request(Some("8.8.8.8"), 200, 1),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    assert_eq!(scene.arcs.len(), 1);
    assert_eq!(scene.summary.empty_groups, 1);
    assert_eq!(scene.arcs[0].color_weight, 0.0);
}

#[test]
fn test_empty_log() {
    let scene = SceneBuilder::new().build(&[], origin(), &mut resolver());
    assert!(scene.arcs.is_empty());
    assert_eq!(scene.summary.total_requests, 0);
    assert_eq!(scene.summary.unresolved_count, 0);
}

// ============================================================================
// Unresolved requests
// ============================================================================

#[test]
fn test_all_failed_requests_produce_no_arcs() {
    let log = vec![request(None, 0, 0), request(None, 0, 1), request(None, 0, 2)];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    assert!(scene.arcs.is_empty());
    assert_eq!(scene.summary.unresolved_count, log.len());
    assert_eq!(scene.summary.failed_requests, log.len());
}

#[test]
fn test_private_address_is_excluded() {
    let log = vec![
        request(Some("10.0.0.5"), 900, 0),
        request(Some("8.8.8.8"), 200, 1),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    assert_eq!(scene.arcs.len(), 1);
    assert_eq!(scene.summary.unresolved_count, 1);
    assert_eq!(scene.summary.failed_requests, 0);
    assert_eq!(
        scene.summary.unresolved_addresses,
        vec!["10.0.0.5".parse::<IpAddr>().unwrap()]
    );
}

#[test]
fn test_uncovered_address_counts_every_request() {
    // 9.9.9.9 is outside every fixture range
    let log = vec![
        request(Some("9.9.9.9"), 100, 0),
        request(Some("9.9.9.9"), 100, 1),
        request(Some("8.8.8.8"), 200, 2),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    assert_eq!(scene.arcs.len(), 1);
    assert_eq!(scene.summary.unresolved_count, 2);
    assert_eq!(scene.summary.unresolved_addresses.len(), 1);
}

// ============================================================================
// Weights and determinism
// ============================================================================

#[test]
fn test_thickness_follows_bytes() {
    let log = vec![
        request(Some("8.8.8.8"), 5_000, 0),
        request(Some("93.184.216.34"), 12, 1),
        request(Some("1.1.1.1"), 700_000, 2),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    let mut by_bytes = scene.arcs.clone();
    by_bytes.sort_by_key(|arc| arc.total_bytes);
    for pair in by_bytes.windows(2) {
        assert!(pair[0].thickness_weight < pair[1].thickness_weight);
    }
    for arc in &scene.arcs {
        assert!(arc.thickness_weight > 0.0);
        assert_eq!(arc.thickness_weight, thickness_for(arc.total_bytes));
    }
}

#[test]
fn test_color_weights_span_unit_interval() {
    let log = vec![
        request(Some("8.8.8.8"), 10, 4),
        request(Some("93.184.216.34"), 10, 9),
        request(Some("1.1.1.1"), 10, 14),
    ];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());

    let weights: Vec<f64> = scene.arcs.iter().map(|arc| arc.color_weight).collect();
    assert_eq!(weights, vec![0.0, 0.5, 1.0]);
    assert_eq!(scene.arcs[0].color, "#ff2d2d");
    assert_eq!(scene.arcs[2].color, "#2d7dff");

    let sequences: Vec<u64> = scene.arcs.iter().map(|arc| arc.effective_sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_single_arc_gets_earliest_color() {
    let log = vec![request(Some("8.8.8.8"), 10, 7)];
    let scene = SceneBuilder::new().build(&log, origin(), &mut resolver());
    assert_eq!(scene.arcs.len(), 1);
    assert_eq!(scene.arcs[0].color_weight, 0.0);
}

#[test]
fn test_builds_are_deterministic() {
    let log = vec![
        request(Some("151.101.1.69"), 300, 0),
        request(Some("8.8.8.8"), 50, 1),
        request(None, 0, 2),
        request(Some("1.1.1.1"), 100, 3),
        request(Some("10.1.1.1"), 100, 4),
        request(Some("93.184.216.34"), 5, 5),
    ];
    let builder = SceneBuilder::new();
    let mut resolver = resolver();

    let first = builder.build(&log, origin(), &mut resolver);
    let second = builder.build(&log, origin(), &mut resolver);
    assert_eq!(first, second);

    // a fresh resolver gives the same answer as a warm one
    let third = builder.build(&log, origin(), &mut self::resolver());
    assert_eq!(first, third);
}
