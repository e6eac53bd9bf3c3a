use std::fmt::Write;

use miner_core::AuditRecord;
use miner_forensics::audit::AuditOutcome;
use miner_forensics::cache::CacheStats;

const SHOWN_FILES: usize = 3;

/// Render audit records as an aligned console table.
pub fn text_table(records: &[AuditRecord], use_color: bool) -> String {
    let mut out = String::new();
    let version = env!("CARGO_PKG_VERSION");
    let _ = writeln!(out, "Origin-Miner v{version} | Forensic Audit");
    let _ = writeln!(
        out,
        "{:<9} {:<12} {:<36} {:>8} {:>10}  Verdict",
        "Hash", "Changes", "Files", "Comments", "Elapsed"
    );
    let _ = writeln!(out, "{:-<96}", "");

    for record in records {
        let files = file_lines(&record.files);
        let elapsed = format!("{}s", record.elapsed_seconds);
        let verdict = verdict_label(record);
        let (elapsed, verdict) = if use_color {
            let color = if record.is_suspicious { "31" } else { "33" };
            (
                format!("\x1b[{color}m{elapsed:>10}\x1b[0m"),
                format!("\x1b[{color}m{verdict}\x1b[0m"),
            )
        } else {
            (format!("{elapsed:>10}"), verdict)
        };

        let _ = writeln!(
            out,
            "{:<9} {:<12} {:<36} {:>7.1}% {}  {}",
            record.short_hash,
            format!("{} lines", record.changes),
            files.first().map(String::as_str).unwrap_or("-"),
            record.comment_ratio * 100.0,
            elapsed,
            verdict,
        );
        for extra in files.iter().skip(1) {
            let _ = writeln!(out, "{:<9} {:<12} {extra}", "", "");
        }
    }
    out
}

/// Render audit records as a GitHub-flavored Markdown table.
pub fn markdown_table(records: &[AuditRecord]) -> String {
    let mut out = String::from("# Forensic Commit Audit\n\n");
    let suspicious = records.iter().filter(|r| r.is_suspicious).count();
    let _ = writeln!(out, "**Commits audited:** {}  ", records.len());
    let _ = writeln!(out, "**Suspicious:** {suspicious}\n");
    out.push_str("| Hash | Author | Changes | Files | Comments | Density | Elapsed | Verdict |\n");
    out.push_str("|------|--------|---------|-------|----------|---------|---------|---------|\n");
    for record in records {
        let _ = writeln!(
            out,
            "| `{}` | {} | {} | {} | {:.1}% | {:.2} | {}s | {} |",
            record.short_hash,
            record.author,
            record.changes,
            file_lines(&record.files).join("<br>"),
            record.comment_ratio * 100.0,
            record.density,
            record.elapsed_seconds,
            verdict_label(record),
        );
    }
    out
}

/// JSON document for `--format json`.
pub fn json_document(outcome: &AuditOutcome) -> serde_json::Value {
    let status = match outcome {
        AuditOutcome::Completed { .. } => "completed",
        AuditOutcome::InsufficientHistory { .. } => "insufficient_history",
        AuditOutcome::RepositoryUnavailable(_) => "repository_unavailable",
    };
    let mut json = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "message": outcome.message(),
        "commitsAudited": outcome.records().len(),
        "suspicious": outcome.suspicious_count(),
        "records": outcome.records(),
    });
    if let AuditOutcome::Completed { stats, .. } = outcome {
        json["stats"] = serde_json::json!(stats);
    }
    json
}

pub fn cache_stats_text(path: &std::path::Path, stats: &CacheStats) -> String {
    format!(
        "Cache: {}\n  Entries:     {}\n  Suspicious:  {}\n  Size:        {} bytes\n",
        path.display(),
        stats.entries,
        stats.suspicious,
        stats.size_bytes
    )
}

fn file_lines(files: &[String]) -> Vec<String> {
    let mut lines: Vec<String> = files.iter().take(SHOWN_FILES).cloned().collect();
    if files.len() > SHOWN_FILES {
        lines.push(format!("...and {} more", files.len() - SHOWN_FILES));
    }
    lines
}

fn verdict_label(record: &AuditRecord) -> String {
    if !record.is_suspicious {
        return "ok".into();
    }
    let rules: Vec<String> = record
        .triggered_rules
        .iter()
        .map(ToString::to_string)
        .collect();
    format!("SUSPICIOUS ({})", rules.join(", "))
}
