use crate::CLAP_STYLING;
use clap::{Arg, arg, command};
use footprint::handlers::{parse_coordinate, parse_seconds, parse_target_url};
use std::net::IpAddr;
use std::path::PathBuf;

/// Flags shared by every subcommand that produces a map
fn run_arguments() -> Vec<Arg> {
    vec![
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Where to write the map (default: ./footprint-<host>.html)"),
        arg!(-f --"format" <FORMAT>)
            .required(false)
            .help("Output format: html (interactive globe) or json (payload only)")
            .value_parser(["html", "json"])
            .default_value("html"),
        arg!(-t --"timeout" <SECONDS>)
            .required(false)
            .help("Give up on the page after this long and map what was seen")
            .value_parser(parse_seconds)
            .default_value("30"),
        arg!(--"quiescence" <SECONDS>)
            .required(false)
            .help("Network silence after load that counts as settled")
            .value_parser(parse_seconds)
            .default_value("3"),
        arg!(--"geo-db" <PATH>)
            .required(false)
            .env("FOOTPRINT_GEO_DB")
            .help(
                "IP2Location DB5 CSV or MaxMind .mmdb database \
            (default: ~/.config/footprint/IP2LOCATION-LITE-DB5.CSV)",
            ),
        arg!(--"origin-ip" <IP>)
            .required(false)
            .help("Start arcs at this address instead of looking up our public IP")
            .value_parser(clap::value_parser!(IpAddr))
            .conflicts_with("origin"),
        arg!(--"origin" <LAT_LON>)
            .required(false)
            .help("Start arcs at a fixed coordinate, e.g. 51.5072,-0.1276")
            .value_parser(parse_coordinate)
            .allow_hyphen_values(true)
            .conflicts_with("origin-ip"),
    ]
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("footprint")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("footprint")
        .about("Map where a single web page load sends its requests")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log more (repeat for debug and trace)")
                .required(false)
                .action(clap::ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("map")
                .about("Load a page, record every request and draw them on a globe")
                .arg(
                    arg!(<URL>)
                        .required(true)
                        .help("The page to load (https:// is assumed)")
                        .value_parser(parse_target_url),
                )
                .args(run_arguments())
                .arg(
                    arg!(-c --"concurrency" <NUM>)
                        .required(false)
                        .help("Subresources fetched in parallel")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("8"),
                ),
        )
        .subcommand(
            command!("replay")
                .about("Draw the requests recorded in a browser's HAR export")
                .arg(
                    arg!(<HAR>)
                        .required(true)
                        .help("HAR file saved from the browser's network panel")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("Page URL for the map title (default: first recorded request)")
                        .value_parser(parse_target_url),
                )
                .arg(
                    arg!(--"paced")
                        .required(false)
                        .help("Replay with the recorded timing instead of all at once")
                        .action(clap::ArgAction::SetTrue),
                )
                .args(run_arguments()),
        )
        .subcommand(
            command!("init")
                .about("Creates the footprint config directory and checks for a geo database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the footprint config directory")
                        .default_value("~/.config/footprint/"),
                ),
        )
}
