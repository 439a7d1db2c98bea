//! Command handlers
//!
//! Each handler returns the text to print so the binary owns stdout.

use serde::Serialize;
use tracing::{debug, info};

use crate::commands::{ConfigArgs, ConfigFormat, LocateArgs, ReportFormat, RunArgs};
use crate::error::{CliError, CliResult};
use crate::output::render_report;
use livedit::{
    build_locator, EditScript, EditorConfig, Locator, MemoryDocument, NodeId, ScriptReport,
    ScriptRunner,
};

/// Rendered report of a script run
#[derive(Debug)]
pub struct ScriptOutput {
    /// Text or JSON rendering
    pub rendered: String,
    /// The report itself
    pub report: ScriptReport,
}

impl ScriptOutput {
    /// Turn a failed report into [`CliError::ScriptFailed`]
    pub fn ensure_passed(&self) -> CliResult<()> {
        if self.report.passed {
            return Ok(());
        }
        Err(CliError::ScriptFailed {
            name: self.report.name.clone(),
            failed: self.report.failures().count(),
            total: self.report.steps.len(),
        })
    }
}

/// Load and run an edit script
pub fn run_script(args: &RunArgs) -> CliResult<ScriptOutput> {
    let script = EditScript::load(&args.script)?;
    info!(path = %args.script.display(), steps = script.steps.len(), "loaded script");

    let mut runner = ScriptRunner::new().with_continue_on_failure(args.continue_on_failure);
    if let Some(path) = &args.config {
        runner = runner.with_config(EditorConfig::load(path)?);
        debug!(path = %path.display(), "using configuration override");
    }

    let report = runner.run(&script)?;
    let rendered = match args.format {
        ReportFormat::Text => render_report(&report, args.show_document),
        ReportFormat::Json => report.to_json()?,
    };
    Ok(ScriptOutput { rendered, report })
}

/// Locator of one element, as printed by `locate`
#[derive(Debug, Serialize)]
pub struct LocateReport {
    /// Selector given on the command line
    pub selector: String,
    /// Handle in the parsed document
    pub node: NodeId,
    /// Whether the primary candidate matches only this element
    pub primary_resolves: bool,
    /// Generated locator
    pub locator: Locator,
}

/// Build the locator for the first element matching a selector
pub fn locate(args: &LocateArgs) -> CliResult<String> {
    let html = std::fs::read_to_string(&args.html)?;
    let doc = MemoryDocument::parse(&html)?;
    let node = doc.select_first(&args.selector)?.ok_or_else(|| {
        CliError::invalid_argument(format!("no element matches `{}`", args.selector))
    })?;

    let mut config = EditorConfig::default().locator;
    if let Some(max) = args.max_candidates {
        if max == 0 {
            return Err(CliError::invalid_argument("--max-candidates must be at least 1"));
        }
        config.max_candidates = max;
    }

    let locator = build_locator(&doc, node, &config)?;
    let report = LocateReport {
        selector: args.selector.clone(),
        node,
        primary_resolves: locator.locate(&doc) == Some(node),
        locator,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Print the default configuration, or a validated file
pub fn show_config(args: &ConfigArgs) -> CliResult<String> {
    let config = match &args.from {
        Some(path) => EditorConfig::load(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?,
        None => EditorConfig::default(),
    };
    match args.format {
        ConfigFormat::Yaml => Ok(config.to_yaml()?),
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(&config)?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn file(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn run_args(script: PathBuf, format: ReportFormat) -> RunArgs {
        RunArgs {
            script,
            format,
            config: None,
            continue_on_failure: false,
            show_document: false,
        }
    }

    const SCRIPT: &str = r##"
name: edit title
document: '<main><h1 id="title">Old</h1></main>'
steps:
  - type: text
    target: "#title"
    text: New
  - type: expect
    selector: "#title"
    text: New
    undo_count: 1
"##;

    mod run_tests {
        use super::*;

        #[test]
        fn test_json_report_is_parseable() {
            let script = file(SCRIPT, ".yaml");
            let output = run_script(&run_args(script.path().into(), ReportFormat::Json)).unwrap();
            let value: serde_json::Value = serde_json::from_str(&output.rendered).unwrap();
            assert_eq!(value["name"], "edit title");
            assert_eq!(value["passed"], true);
            assert_eq!(value["steps"].as_array().unwrap().len(), 2);
            assert!(output.ensure_passed().is_ok());
        }

        #[test]
        fn test_failed_script_maps_to_error() {
            let yaml = SCRIPT.replace("text: New\n    undo_count", "text: Other\n    undo_count");
            let script = file(&yaml, ".yaml");
            let output = run_script(&run_args(script.path().into(), ReportFormat::Text)).unwrap();
            assert!(!output.report.passed);
            let err = output.ensure_passed().unwrap_err();
            assert!(matches!(err, CliError::ScriptFailed { failed: 1, total: 2, .. }));
        }

        #[test]
        fn test_config_override_is_validated() {
            let script = file(SCRIPT, ".yaml");
            let config = file("history:\n  max_history: 0\n", ".yaml");
            let mut args = run_args(script.path().into(), ReportFormat::Text);
            args.config = Some(config.path().into());
            let err = run_script(&args).unwrap_err();
            assert!(err.to_string().contains("max_history"));
        }

        #[test]
        fn test_missing_script_is_io_error() {
            let args = run_args(PathBuf::from("/nonexistent/edit.yaml"), ReportFormat::Text);
            assert!(matches!(
                run_script(&args),
                Err(CliError::Livedit(livedit::LiveditError::Io(_)))
            ));
        }
    }

    mod locate_tests {
        use super::*;

        #[test]
        fn test_locate_prints_locator_json() {
            let html = file(r#"<main><button data-testid="save">Save</button></main>"#, ".html");
            let args = LocateArgs {
                html: html.path().into(),
                selector: "button".to_string(),
                max_candidates: None,
            };
            let value: serde_json::Value = serde_json::from_str(&locate(&args).unwrap()).unwrap();
            assert_eq!(value["primary_resolves"], true);
            assert_eq!(value["locator"]["selectors"][0], "[data-testid=\"save\"]");
        }

        #[test]
        fn test_locate_unmatched_selector() {
            let html = file("<main></main>", ".html");
            let args = LocateArgs {
                html: html.path().into(),
                selector: "#nope".to_string(),
                max_candidates: None,
            };
            assert!(matches!(locate(&args), Err(CliError::InvalidArgument { .. })));
        }

        #[test]
        fn test_locate_rejects_zero_candidates() {
            let html = file("<main><p>x</p></main>", ".html");
            let args = LocateArgs {
                html: html.path().into(),
                selector: "p".to_string(),
                max_candidates: Some(0),
            };
            assert!(locate(&args).is_err());
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_default_config_yaml_round_trips() {
            let args = ConfigArgs {
                from: None,
                format: ConfigFormat::Yaml,
            };
            let yaml = show_config(&args).unwrap();
            assert_eq!(EditorConfig::from_yaml_str(&yaml).unwrap(), EditorConfig::default());
        }

        #[test]
        fn test_config_from_json_file() {
            let config = file(r#"{"history": {"max_history": 5}}"#, ".json");
            let args = ConfigArgs {
                from: Some(config.path().into()),
                format: ConfigFormat::Json,
            };
            let value: serde_json::Value = serde_json::from_str(&show_config(&args).unwrap()).unwrap();
            assert_eq!(value["history"]["max_history"], 5);
        }

        #[test]
        fn test_invalid_config_file_names_path() {
            let config = file("history:\n  max_history: 0\n", ".yaml");
            let args = ConfigArgs {
                from: Some(config.path().into()),
                format: ConfigFormat::Yaml,
            };
            let err = show_config(&args).unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }
    }
}
