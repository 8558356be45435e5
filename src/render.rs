//! Markdown projections of reports.
//!
//! Everything here is a pure function of its input. JSON output goes through
//! serde directly and does not pass through this module.

use crate::core::{GraphOutcome, Payload};
use crate::feasibility::{FeasibilityReport, Finding};
use crate::workflow::{StepStatus, ValidationRun};

/// Escape a value for use inside a markdown table cell.
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn table(header: &[&str], rows: impl IntoIterator<Item = Vec<String>>) -> Vec<String> {
    let mut lines = vec![
        format!("| {} |", header.join(" | ")),
        format!("|{}|", vec!["---"; header.len()].join("|")),
    ];
    lines.extend(rows.into_iter().map(|row| {
        let cells: Vec<String> = row.iter().map(|c| cell(c)).collect();
        format!("| {} |", cells.join(" | "))
    }));
    lines
}

fn findings(title: &str, items: &[Finding]) -> Vec<String> {
    if items.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![String::new(), format!("### {}", title), String::new()];
    for (i, finding) in items.iter().enumerate() {
        let effort = finding
            .estimated_effort
            .map(|e| format!(" (effort: {})", e))
            .unwrap_or_default();
        lines.push(format!("{}. {}", i + 1, finding.description));
        lines.push(format!("   - Resolution: {}{}", finding.resolution, effort));
    }
    lines
}

pub fn feasibility_report(feature: &str, report: &FeasibilityReport) -> String {
    let mut lines = vec![
        format!("## Feasibility: {}", feature),
        String::new(),
        format!("**Score:** {}/10", report.score),
        format!("**Status:** {}", report.status),
        String::new(),
    ];
    lines.extend(table(
        &["Dependency", "Kind", "Status", "Notes"],
        report.checklist.iter().map(|item| {
            vec![
                item.dependency_name.clone(),
                item.kind.to_string(),
                item.status.to_string(),
                item.note.clone(),
            ]
        }),
    ));
    lines.extend(findings("Blockers", &report.blockers));
    lines.extend(findings("Warnings", &report.warnings));
    lines.extend(findings("Notes", &report.infos));
    lines.push(String::new());
    lines.push(format!("**Recommendation:** {}", report.recommendation));
    lines.join("\n") + "\n"
}

pub fn validation_run(run: &ValidationRun) -> String {
    let mut lines = vec![
        format!("## Validation {}", run.id.short()),
        String::new(),
        format!("**Overall:** {}", run.overall),
        format!("**Phase:** {}", run.phase),
        String::new(),
    ];
    lines.extend(table(
        &["Step", "Kind", "Command", "Status", "Exit"],
        run.steps.iter().map(|step| {
            vec![
                step.name.clone(),
                step.kind.to_string(),
                format!("`{}`", step.command),
                step.status.to_string(),
                step.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
            ]
        }),
    ));
    if let Some(step) = run.steps.iter().find(|s| s.status == StepStatus::Fail) {
        lines.push(String::new());
        lines.push(format!("### {} output", step.name));
        lines.push(String::new());
        lines.push("```".to_string());
        lines.push(step.output.trim_end().to_string());
        lines.push("```".to_string());
    }
    lines.join("\n") + "\n"
}

fn summary(payload: Option<&Payload>) -> String {
    match payload {
        None => String::new(),
        Some(Payload::Text(text)) => text.lines().next().unwrap_or_default().to_string(),
        Some(Payload::Structured(value)) => value.to_string(),
        Some(Payload::Nested(outcome)) => {
            let ok = outcome.succeeded().count();
            format!("{}/{} child tasks succeeded", ok, outcome.len())
        }
    }
}

pub fn graph_outcome(outcome: &GraphOutcome) -> String {
    let succeeded = outcome.succeeded().count();
    let mut lines = vec![
        "## Dispatch".to_string(),
        String::new(),
        format!("{} of {} nodes succeeded", succeeded, outcome.len()),
        String::new(),
    ];
    let rows = outcome.batches.iter().flat_map(|batch| {
        batch.nodes.iter().filter_map(move |id| {
            outcome.get(id).map(|report| {
                vec![
                    batch.depth.to_string(),
                    report.id.to_string(),
                    report.role.to_string(),
                    report.status.to_string(),
                    summary(report.result.as_ref()),
                ]
            })
        })
    });
    lines.extend(table(&["Batch", "Node", "Role", "Status", "Result"], rows));
    lines.join("\n") + "\n"
}
