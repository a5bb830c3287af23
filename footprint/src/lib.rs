// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    default_output_path, parse_coordinate, parse_seconds, parse_target_url, run_options_from_args,
};

// Re-export the run pipeline from footprint-core
pub use footprint_core::pipeline::{RunError, RunOptions, RunReport, execute_run};
pub use footprint_core::summary::generate_run_report;
