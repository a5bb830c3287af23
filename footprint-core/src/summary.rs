// Plain-text run summary for the terminal

use crate::pipeline::RunReport;
use footprint_capture::Termination;

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn termination_line(report: &RunReport) -> String {
    match report.termination {
        Termination::TimedOut => format!(
            "{} after {:.1}s (PARTIAL: page never settled)",
            report.termination.as_str(),
            report.elapsed.as_secs_f64()
        ),
        _ => format!(
            "{} after {:.1}s",
            report.termination.as_str(),
            report.elapsed.as_secs_f64()
        ),
    }
}

pub fn generate_run_report(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str(HEAVY_RULE);
    out.push_str("                              FOOTPRINT RUN\n");
    out.push_str(HEAVY_RULE);
    out.push('\n');

    out.push_str(&format!("Target:       {}\n", report.target));
    out.push_str(&format!("Capture:      {}\n", termination_line(report)));
    let origin_note = match (report.origin.fell_back, report.origin.address) {
        (true, _) => " (fallback)".to_string(),
        (false, Some(ip)) => format!(" ({})", ip),
        (false, None) => String::new(),
    };
    out.push_str(&format!("Origin:       {}{}\n", report.origin.coordinate, origin_note));
    out.push_str(&format!("Geo database: {}\n", report.geo_database));
    out.push_str(&format!("Output:       {}\n", report.output.display()));
    out.push('\n');

    out.push_str(HEAVY_RULE);
    out.push_str("SUMMARY\n");
    out.push_str(HEAVY_RULE);
    out.push('\n');
    out.push_str(&format!("  Requests:        {}\n", summary.total_requests));
    out.push_str(&format!("  Failed:          {}\n", summary.failed_requests));
    out.push_str(&format!("  Unresolved:      {}\n", summary.unresolved_count));
    if !summary.unresolved_addresses.is_empty() {
        let addresses: Vec<String> = summary
            .unresolved_addresses
            .iter()
            .map(|ip| ip.to_string())
            .collect();
        out.push_str(&format!("                   {}\n", addresses.join(", ")));
    }
    if summary.empty_groups > 0 {
        out.push_str(&format!("  Empty:           {}\n", summary.empty_groups));
    }
    out.push_str(&format!("  Arcs rendered:   {}\n", summary.arcs_rendered));
    out.push_str(&format!(
        "  Geo lookups:     {} ({} cached)\n",
        report.cache.lookups, report.cache.hits
    ));
    out.push('\n');

    if !report.arcs.is_empty() {
        out.push_str(HEAVY_RULE);
        out.push_str("DESTINATIONS (first contact first)\n");
        out.push_str(HEAVY_RULE);
        out.push('\n');
        for (idx, arc) in report.arcs.iter().enumerate() {
            out.push_str(&format!(
                "  {:>3}. {}  {:>10}  {:>3} req  {}  {}\n",
                idx + 1,
                arc.color,
                format_bytes(arc.total_bytes),
                arc.request_count,
                arc.destination,
                arc.host_label
            ));
        }
        out.push('\n');
    }

    out
}
