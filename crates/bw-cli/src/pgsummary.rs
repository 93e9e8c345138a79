//! `backwatch pgbackrest-summary`: a readable view of `pgbackrest info --output=json`.

use std::fmt::Write as _;

use bw_acquire_ssh::pgbackrest::{signals_from_info, summarize, Stanza, BACKUP_TYPES};
use bw_core::{JobFilter, JobRegistry, SourceKind, StalenessPolicy, Subsystem};
use chrono::{Local, TimeZone};

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}PB")
}

pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

fn format_timestamp(epoch: i64) -> String {
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Largest whole unit only: `3d ago`, `5h ago`.
fn time_ago(epoch: i64, now: i64) -> String {
    let delta = now - epoch;
    if delta < 0 {
        "in the future".to_string()
    } else if delta >= 86_400 {
        format!("{}d ago", delta / 86_400)
    } else if delta >= 3600 {
        format!("{}h ago", delta / 3600)
    } else if delta >= 60 {
        format!("{}m ago", delta / 60)
    } else {
        format!("{delta}s ago")
    }
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "-".repeat(60));
}

/// Summary of every stanza with engine verdicts for the newest backup of
/// each (repository, type).
pub fn render(stanzas: &[Stanza], now: f64, policy: &StalenessPolicy) -> String {
    let registry = JobRegistry::from_signals(signals_from_info(stanzas, SourceKind::DirectProbe), Vec::new(), now, policy);
    let now_secs = now as i64;
    let mut out = String::new();

    for stanza in stanzas {
        let s = summarize(stanza);
        let _ = writeln!(out, "pgBackRest backup summary - stanza: {}", s.name);
        if !s.status.is_empty() {
            let _ = writeln!(out, "Stanza status: {}", s.status);
        }
        out.push('\n');

        section(&mut out, "Repository status");
        for repo in &s.repos {
            let _ = writeln!(out, "  Repo {}: {}", repo.key, repo.status);
        }
        out.push('\n');

        if s.total_backups == 0 {
            let _ = writeln!(out, "  No backups found\n");
            continue;
        }

        section(&mut out, "Backups by repository");
        for repo in &s.repos {
            let _ = writeln!(
                out,
                "  Repo {}: {} backups ({} full, {} incr, {} diff)",
                repo.key,
                repo.total(),
                repo.count("full"),
                repo.count("incr"),
                repo.count("diff")
            );
        }
        out.push('\n');

        section(&mut out, "Latest backups");
        let _ = writeln!(out, "  {:<6} {:<6} {:<18} {:<10} {:<8} {}", "Repo", "Type", "Timestamp", "Age", "Status", "Detail");
        let filter = JobFilter { subsystems: vec![Subsystem::PhysicalDbBackup], ..Default::default() };
        let prefix = stanza.job_name("");
        for record in registry.list_job_records(&filter) {
            let Some(kind) = record.identity.name.strip_prefix(&prefix) else { continue };
            let stop = record.signal.last_success_epoch_seconds.map(|t| t as i64);
            let _ = writeln!(
                out,
                "  {:<6} {:<6} {:<18} {:<10} {:<8} {}",
                record.identity.target.as_deref().unwrap_or("?"),
                kind,
                stop.map(format_timestamp).unwrap_or_else(|| "-".to_string()),
                stop.map(|t| time_ago(t, now_secs)).unwrap_or_else(|| "Never".to_string()),
                record.verdict.state.as_str(),
                record.verdict.detail
            );
        }
        out.push('\n');

        section(&mut out, "Full backups");
        for repo in &s.repos {
            if let Some((label, stop, size)) = &repo.latest_full {
                let _ = writeln!(out, "  {:<6} {:<26} {:<18} {}", repo.key, label, format_timestamp(*stop), format_size(*size));
            }
        }
        out.push('\n');

        section(&mut out, "Recent incremental backups (last 5 per repo)");
        for repo in s.repos.iter().filter(|r| !r.recent_incr.is_empty()) {
            let _ = writeln!(out, "  Repo {}:", repo.key);
            for (stop, delta, repo_delta, duration) in &repo.recent_incr {
                let _ = writeln!(
                    out,
                    "    {} | delta {:>8} -> {:>8} (compressed) | {:>6}",
                    format_timestamp(*stop),
                    format_size(*delta),
                    format_size(*repo_delta),
                    format_duration(*duration)
                );
            }
        }
        out.push('\n');

        if let (Some(first), Some(last)) = (&s.first_wal, &s.last_wal) {
            section(&mut out, "WAL archive range");
            let _ = writeln!(out, "  First WAL: {first}");
            let _ = writeln!(out, "  Last WAL:  {last}\n");
        }

        section(&mut out, "Storage");
        for repo in s.repos.iter().filter(|r| r.full_size > 0) {
            let _ = writeln!(out, "  Repo {}: ~{} (full backup size)", repo.key, format_size(repo.full_size));
        }
        let _ = writeln!(out, "\n  Total backups: {}", s.total_backups);
        let _ = writeln!(out, "  Backup types: {}\n", BACKUP_TYPES.join(", "));
    }
    out
}
