//! Livedit CLI Library
//!
//! Command-line interface for the Livedit editing core: run deterministic
//! edit scripts, print generated locators and inspect configuration.

#![warn(missing_docs)]
#![allow(clippy::format_push_string)] // String building is clear and correct

mod commands;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, ConfigFormat, LocateArgs, ReportFormat, RunArgs,
};
pub use error::{CliError, CliResult};
pub use handlers::{locate, run_script, show_config, LocateReport, ScriptOutput};
pub use output::render_report;
