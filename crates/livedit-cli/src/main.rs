//! Livedit CLI: run edit scripts against the editing core
//!
//! ## Usage
//!
//! ```bash
//! livedit run demos/undo_redo.yaml            # Run a script, text report
//! livedit run edit.yaml --format json         # Full JSON report
//! livedit locate page.html ".card > h2"       # Print a locator
//! livedit config                              # Print default configuration
//! ```

use clap::Parser;
use livedit_cli::{handlers, logging, Cli, CliResult, Commands, ReportFormat};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::apply_color(cli.color);
    logging::init_tracing(cli.verbose, cli.quiet, cli.log_json);

    match cli.command {
        Commands::Run(args) => {
            let output = handlers::run_script(&args)?;
            if !cli.quiet || args.format == ReportFormat::Json {
                println!("{}", output.rendered.trim_end());
            }
            output.ensure_passed()
        }
        Commands::Locate(args) => {
            println!("{}", handlers::locate(&args)?);
            Ok(())
        }
        Commands::Config(args) => {
            println!("{}", handlers::show_config(&args)?.trim_end());
            Ok(())
        }
    }
}
