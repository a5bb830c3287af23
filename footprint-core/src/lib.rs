pub mod artifact;
pub mod geo;
pub mod origin;
pub mod pipeline;
pub mod scene;
pub mod settings;
pub mod summary;

use colored::Colorize;

pub use artifact::{ArtifactFormat, ArtifactMeta, EmitError};
pub use geo::{GeoCoordinate, GeoDatabase, GeoDbError, GeoResolver, ResolutionFailure};
pub use origin::{Origin, OriginPolicy};
pub use pipeline::{RunError, RunOptions, RunReport, execute_run};
pub use scene::{ArcRecord, RunSummary, Scene, SceneBuilder};
pub use settings::Settings;
pub use summary::generate_run_report;

const BANNER: &str = r#"
   ┌─┐┌─┐┌─┐┌┬┐┌─┐┬─┐┬┌┐┌┌┬┐
   ├┤ │ ││ │ │ ├─┘├┬┘││││ │
   └  └─┘└─┘ ┴ ┴  ┴└─┴┘└┘ ┴ "#;

pub fn print_banner() {
    println!("{}", BANNER.bright_cyan().bold());
    println!(
        "   {} {}\n",
        "where does your page load go?".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
