//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Livedit: run edit scripts against the editing core
#[derive(Parser, Debug)]
#[command(name = "livedit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a YAML edit script and report each step
    Run(RunArgs),

    /// Print the locator generated for an element
    Locate(LocateArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Edit script to run
    pub script: PathBuf,

    /// Report format
    #[arg(short, long, default_value = "text")]
    pub format: ReportFormat,

    /// Configuration file (YAML or JSON) replacing the script's own
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep executing after a failed step
    #[arg(long = "continue")]
    pub continue_on_failure: bool,

    /// Print the final document markup after the report
    #[arg(long)]
    pub show_document: bool,
}

/// Arguments for the locate command
#[derive(Parser, Debug)]
pub struct LocateArgs {
    /// HTML file holding the document
    pub html: PathBuf,

    /// Selector of the element to describe
    pub selector: String,

    /// Maximum selector candidates (overrides the default)
    #[arg(long)]
    pub max_candidates: Option<usize>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Load and validate this file instead of printing the defaults
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,
}

/// Script report format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Full report as JSON
    Json,
}

/// Configuration output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML document
    #[default]
    Yaml,
    /// Pretty JSON
    Json,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_flags() {
        let cli = Cli::try_parse_from([
            "livedit", "-vv", "run", "edit.yaml", "--format", "json", "--continue",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.script, PathBuf::from("edit.yaml"));
        assert_eq!(args.format, ReportFormat::Json);
        assert!(args.continue_on_failure);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_locate() {
        let cli =
            Cli::try_parse_from(["livedit", "locate", "page.html", "#title", "--max-candidates", "2"])
                .unwrap();
        let Commands::Locate(args) = cli.command else {
            panic!("expected locate");
        };
        assert_eq!(args.selector, "#title");
        assert_eq!(args.max_candidates, Some(2));
    }

    #[test]
    fn test_config_defaults_to_yaml() {
        let cli = Cli::try_parse_from(["livedit", "config"]).unwrap();
        let Commands::Config(args) = cli.command else {
            panic!("expected config");
        };
        assert_eq!(args.format, ConfigFormat::Yaml);
        assert_eq!(cli.color, ColorArg::Auto);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["livedit", "run", "x.yaml", "--format", "tap"]).is_err());
    }
}
