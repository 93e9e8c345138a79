//! Text table and JSON output for `backwatch status`.

use std::collections::BTreeMap;

use bw_core::{
    format_threshold, Fault, JobRecord, Report, ReportOutcome, SourceKind, StalenessPolicy, Subsystem, VerdictState,
};
use bw_runner::{Mode, RunResult};
use serde::Serialize;

/// `1d 2h 3m ago`; minutes are always shown when nothing larger is.
pub fn format_age(age_seconds: Option<f64>) -> String {
    let Some(age) = age_seconds else {
        return "Never".to_string();
    };
    if age < 0.0 {
        return "in the future".to_string();
    }
    let secs = age as u64;
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    format!("{} ago", parts.join(" "))
}

/// `tank/services/media/sonarr` -> `tank/.../sonarr`
pub fn shorten_dataset(dataset: &str) -> String {
    let parts: Vec<&str> = dataset.split('/').collect();
    match parts.as_slice() {
        [first, .., last] if parts.len() > 2 => format!("{first}/.../{last}"),
        _ => dataset.to_string(),
    }
}

/// `name (location)` from display labels, else the raw target.
pub fn target_display(record: &JobRecord) -> String {
    let (name_key, location_key) = match record.identity.subsystem {
        Subsystem::PhysicalDbBackup => ("repo_name", "repo_location"),
        Subsystem::Replication => ("target_name", "target_location"),
        Subsystem::SnapshotBackup => ("repository_name", "repository_location"),
    };
    let target = record.identity.target.as_deref();
    match (record.meta(name_key), record.meta(location_key)) {
        (Some(name), Some(location)) => format!("{name} ({location})"),
        (Some(name), None) => name.to_string(),
        _ => match (record.identity.subsystem, target) {
            (Subsystem::PhysicalDbBackup, Some(key)) => format!("repo{key}"),
            (_, Some(t)) => t.to_string(),
            (_, None) => "unknown".to_string(),
        },
    }
}

fn job_display(record: &JobRecord) -> String {
    match record.identity.subsystem {
        Subsystem::Replication => shorten_dataset(&record.identity.name),
        _ => record.identity.name.clone(),
    }
}

fn details(record: &JobRecord) -> String {
    match record.meta("restic_error") {
        Some(err) => format!("{}: {err}", record.verdict.detail),
        None => record.verdict.detail.clone(),
    }
}

/// Left-aligned columns padded to the widest cell.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        push_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells.zip(widths).map(|(c, &w)| format!("{c:<w$}")).collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

pub fn summary_line(report: &Report) -> String {
    let s = &report.summary;
    format!(
        "Total: {} | OK: {} | Running: {} | Stale: {} | Failed: {} | Error: {} | Unknown: {}",
        s.total(),
        s.get(VerdictState::Ok),
        s.get(VerdictState::Running),
        s.get(VerdictState::Stale),
        s.get(VerdictState::Failed),
        s.get(VerdictState::Error),
        s.get(VerdictState::Unknown),
    )
}

pub fn thresholds_line(policy: &StalenessPolicy) -> String {
    let parts: Vec<String> = Subsystem::ALL
        .iter()
        .map(|s| format!("{} {}", s.label(), format_threshold(policy.threshold_seconds(*s))))
        .collect();
    format!("Stale thresholds: {}", parts.join(", "))
}

pub fn render_text(res: &RunResult, report: &Report) -> String {
    let rows: Vec<Vec<String>> = report
        .records
        .iter()
        .map(|r| {
            vec![
                r.identity.subsystem.label().to_string(),
                target_display(r),
                job_display(r),
                r.verdict.state.to_string(),
                format_age(r.verdict.age_seconds),
                details(r),
            ]
        })
        .collect();
    let mut out = format!("Backup status for {} ({} mode)\n\n", res.host, res.mode.as_str());
    out.push_str(&table(&["System", "Target", "Job", "Status", "Last Success", "Details"], &rows));
    out.push('\n');
    out.push_str(&summary_line(report));
    out.push_str("\n\n");
    out.push_str(&format!("Data source: {}\n", res.source));
    out.push_str(&thresholds_line(&res.policy));
    out.push('\n');
    out
}

/// Operator message for a run that produced no rows.
pub fn empty_message(res: &RunResult, report: &Report) -> Option<String> {
    match &report.outcome {
        ReportOutcome::Jobs => None,
        ReportOutcome::FilteredEmpty => {
            Some(format!("No jobs match the given filters ({} jobs discovered).", res.registry.len()))
        }
        ReportOutcome::NoIdentitiesDiscovered { reason } => Some(format!(
            "No backup jobs found: {reason}. Check the exporters and queries.\nQuerying: {}",
            res.source
        )),
    }
}

#[derive(Serialize)]
struct JsonJob<'a> {
    subsystem: Subsystem,
    system: &'static str,
    name: &'a str,
    target: Option<&'a str>,
    target_display: String,
    state: VerdictState,
    detail: &'a str,
    age_seconds: Option<f64>,
    last_success: String,
    last_success_epoch_seconds: Option<f64>,
    error_flag: Option<bool>,
    metadata: &'a BTreeMap<String, String>,
    sources: Vec<SourceKind>,
}

#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    ok: usize,
    running: usize,
    stale: usize,
    failed: usize,
    error: usize,
    unknown: usize,
    healthy: usize,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    host: &'a str,
    mode: Mode,
    source: &'a str,
    thresholds: &'a StalenessPolicy,
    jobs: Vec<JsonJob<'a>>,
    summary: JsonSummary,
    faults: &'a [Fault],
    #[serde(flatten)]
    outcome: &'a ReportOutcome,
}

pub fn render_json(res: &RunResult, report: &Report) -> serde_json::Result<String> {
    let s = &report.summary;
    let doc = JsonReport {
        host: &res.host,
        mode: res.mode,
        source: &res.source,
        thresholds: &res.policy,
        jobs: report
            .records
            .iter()
            .map(|r| JsonJob {
                subsystem: r.identity.subsystem,
                system: r.identity.subsystem.label(),
                name: &r.identity.name,
                target: r.identity.target.as_deref(),
                target_display: target_display(r),
                state: r.verdict.state,
                detail: &r.verdict.detail,
                age_seconds: r.verdict.age_seconds,
                last_success: format_age(r.verdict.age_seconds),
                last_success_epoch_seconds: r.signal.last_success_epoch_seconds,
                error_flag: r.signal.error_flag,
                metadata: &r.signal.metadata,
                sources: r.signal.sources.iter().copied().collect(),
            })
            .collect(),
        summary: JsonSummary {
            total: s.total(),
            ok: s.get(VerdictState::Ok),
            running: s.get(VerdictState::Running),
            stale: s.get(VerdictState::Stale),
            failed: s.get(VerdictState::Failed),
            error: s.get(VerdictState::Error),
            unknown: s.get(VerdictState::Unknown),
            healthy: s.healthy(),
        },
        faults: &report.faults,
        outcome: &report.outcome,
    };
    serde_json::to_string_pretty(&doc)
}
