//! Report rendering

use console::style;
use livedit::{ScriptReport, TxAction, VerificationResult, VerifyOutcome};
use std::collections::BTreeMap;

/// Render a script report for a terminal
#[must_use]
pub fn render_report(report: &ScriptReport, show_document: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {}  {}\n",
        style("Script:").bold(),
        display_name(report),
        style(format!("(session {})", report.session_id)).dim()
    ));

    for step in &report.steps {
        let mark = if step.passed {
            style("✓").green()
        } else {
            style("✗").red()
        };
        out.push_str(&format!(
            "  {mark} {:>3} {:<14} @ {}ms",
            step.index, step.kind, step.clock_ms
        ));
        if let Some(error) = &step.error {
            out.push_str(&format!("  {}", style(error).red()));
        }
        out.push('\n');
    }
    if report.skipped_steps > 0 {
        out.push_str(&format!(
            "  {}\n",
            style(format!("… {} steps skipped", report.skipped_steps)).yellow()
        ));
    }

    out.push_str(&format!(
        "{} {}\n",
        style("History:").bold(),
        summarize_events(report)
    ));

    if !report.verifications.is_empty() {
        out.push_str(&format!("{}\n", style("Verifications:").bold()));
        for result in &report.verifications {
            out.push_str(&format!("  {}\n", describe_verification(result)));
        }
    }

    if !report.errors.is_empty() {
        out.push_str(&format!("{}\n", style("Errors:").bold()));
        for error in &report.errors {
            out.push_str(&format!("  {}\n", style(error).red()));
        }
    }

    out.push_str(&format!(
        "{} {}ms (advanced {}ms)\n",
        style("Clock:").bold(),
        report.clock.time_ms,
        report.clock.advanced_ms
    ));

    if show_document {
        out.push_str(&format!("{}\n{}\n", style("Document:").bold(), report.document));
    }

    let verdict = if report.passed {
        style("PASSED").green().bold()
    } else {
        style("FAILED").red().bold()
    };
    out.push_str(&format!("{verdict}\n"));
    out
}

fn display_name(report: &ScriptReport) -> &str {
    if report.name.is_empty() {
        "(unnamed)"
    } else {
        &report.name
    }
}

/// One-line count of history events by action
fn summarize_events(report: &ScriptReport) -> String {
    if report.events.is_empty() {
        return "no events".to_string();
    }
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in &report.events {
        *counts.entry(action_name(event.action)).or_default() += 1;
    }
    let parts: Vec<String> = counts
        .iter()
        .map(|(action, count)| format!("{action} {count}"))
        .collect();
    format!("{} events ({})", report.events.len(), parts.join(", "))
}

const fn action_name(action: TxAction) -> &'static str {
    match action {
        TxAction::Push => "push",
        TxAction::Merge => "merge",
        TxAction::Undo => "undo",
        TxAction::Redo => "redo",
        TxAction::Clear => "clear",
        TxAction::Rollback => "rollback",
    }
}

fn describe_verification(result: &VerificationResult) -> String {
    let outcome = match result.outcome {
        VerifyOutcome::Verified => style(result.outcome.to_string()).green(),
        VerifyOutcome::Mismatch | VerifyOutcome::Lost => style(result.outcome.to_string()).red(),
        _ => style(result.outcome.to_string()).yellow(),
    };
    let mut line = format!(
        "tx {} {}: {outcome} ({}) after {}ms",
        result.tx_id,
        result.tx_type,
        result.reason,
        result.timing.elapsed_ms()
    );
    if let Some(resolved) = &result.resolved {
        line.push_str(&format!(
            ", resolved {}",
            format!("{:?}", resolved.tier).to_lowercase()
        ));
    }
    for diff in result.style_diff.iter().filter(|diff| !diff.matches) {
        line.push_str(&format!(
            "\n      {}: expected {:?}, found {:?}",
            diff.property, diff.expected, diff.actual
        ));
    }
    line
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use livedit::{EditScript, ScriptRunner};

    fn run(yaml: &str) -> ScriptReport {
        let script = EditScript::from_yaml_str(yaml).unwrap();
        ScriptRunner::new().run(&script).unwrap()
    }

    const PASSING: &str = r##"
name: undo color
document: '<main><p id="p">Hi</p></main>'
steps:
  - type: style
    target: "#p"
    property: color
    value: red
  - type: undo
  - type: expect
    selector: "#p"
    redo_count: 1
"##;

    #[test]
    fn test_passing_report_lists_steps() {
        let text = console::strip_ansi_codes(&render_report(&run(PASSING), false)).to_string();
        assert!(text.contains("Script: undo color"));
        assert!(text.contains("1 style"));
        assert!(text.contains("3 expect"));
        assert!(text.contains("2 events (push 1, undo 1)"));
        assert!(text.trim_end().ends_with("PASSED"));
        assert!(!text.contains("Document:"));
    }

    #[test]
    fn test_failed_report_shows_error_and_skips() {
        let yaml = r##"
document: '<main><p id="p">Hi</p></main>'
steps:
  - type: expect
    selector: "#p"
    text: Bye
  - type: clear
"##;
        let text = console::strip_ansi_codes(&render_report(&run(yaml), true)).to_string();
        assert!(text.contains("(unnamed)"));
        assert!(text.contains("✗"));
        assert!(text.contains("1 steps skipped"));
        assert!(text.contains("Document:"));
        assert!(text.trim_end().ends_with("FAILED"));
    }

    #[test]
    fn test_no_events_summary() {
        let yaml = "document: '<p></p>'\nsteps:\n  - type: advance\n    ms: 5\n";
        let report = run(yaml);
        assert_eq!(summarize_events(&report), "no events");
    }
}
