//! Markdown rendering of a run report

use std::fmt::Write as _;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::errors::ApplicationError;
use super::sync_runner::{EntryOutcome, RunReport, RunStatus};
use crate::domain::ChangeRecord;

/// Rows shown in the detailed change table
pub const DEFAULT_TOP_CHANGES: usize = 25;

#[derive(Debug, Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Share")]
    share: String,
}

#[derive(Debug, Tabled)]
struct ChangeRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Stars")]
    stars: String,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "License")]
    license: &'static str,
}

#[derive(Debug, Tabled)]
struct FailureRow {
    #[tabled(rename = "Entry")]
    entry: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn stat_rows(report: &RunReport) -> Vec<StatRow> {
    let s = &report.summary;
    let row = |metric, count| StatRow {
        metric,
        count,
        share: format!("{:.1}%", s.percent(count)),
    };
    vec![
        row("Entries", s.total_entries),
        row("Updated", s.updated),
        row("Unchanged", s.unchanged),
        row("No releases", s.no_releases),
        row("Star count changed", s.stars_changed),
        row("Version changed", s.versions_changed),
        row("Skipped (no source / invalid url)", s.skipped),
        row("Fetch failed", s.failed),
        row("Rate limited", s.rate_limited),
        row("Not processed", s.not_processed),
    ]
}

fn change_row(change: &ChangeRecord) -> ChangeRow {
    let stars = match change.old_stars {
        Some(old) => format!("{} → {}", old, change.new_stars),
        None => change.new_stars.to_string(),
    };
    let version = match (&change.old_version, &change.new_version) {
        (old, new) if change.version_changed => format!(
            "{} → {}",
            old.as_deref().unwrap_or("-"),
            new.as_deref().unwrap_or("-")
        ),
        (_, new) => new.clone().unwrap_or_else(|| "-".to_string()),
    };
    ChangeRow {
        repository: format!("[{}]({})", change.repository, change.link),
        stars,
        change: format!("{:+}", change.star_diff),
        version,
        license: if change.license_changed { "changed" } else { "" },
    }
}

/// Render the report as markdown: headline, statistics, the `top` largest
/// changes and any failures
pub fn render_markdown(report: &RunReport, top: usize) -> String {
    let mut out = String::new();
    let title = if report.dry_run {
        "Catalog sync report (dry run)"
    } else {
        "Catalog sync report"
    };
    let _ = writeln!(out, "## {}\n", title);

    let status = match report.status {
        RunStatus::Completed => "completed",
        RunStatus::StoppedRateLimited => "stopped early (rate limited)",
    };
    let _ = writeln!(
        out,
        "Run `{}` {} at {} UTC in {} mode, {} of {} repositories processed with parallelism {}.\n",
        report.id,
        status,
        report.finished_at.format("%Y-%m-%d %H:%M:%S"),
        report.mode.as_str(),
        report.summary.processed(),
        report.summary.repositories,
        report.parallelism
    );
    if let Some(recommendation) = &report.recommendation {
        let _ = writeln!(out, "> **Warning:** {}\n", recommendation);
    }
    if report.summary.beyond_limit > 0 {
        let _ = writeln!(
            out,
            "{} entries were left out by the processing limit.\n",
            report.summary.beyond_limit
        );
    }

    let _ = writeln!(out, "### Statistics\n");
    let _ = writeln!(out, "{}\n", Table::new(stat_rows(report)).with(Style::markdown()));

    let notable: Vec<ChangeRow> = report
        .changes
        .iter()
        .filter(|c| c.has_changes())
        .take(top)
        .map(change_row)
        .collect();
    let _ = writeln!(out, "### Largest changes\n");
    if notable.is_empty() {
        let _ = writeln!(out, "No changes.\n");
    } else {
        let _ = writeln!(out, "{}\n", Table::new(notable).with(Style::markdown()));
    }

    let failures: Vec<FailureRow> = report
        .entries
        .iter()
        .filter_map(|e| match &e.outcome {
            EntryOutcome::Failed { message, .. } => Some((e, message.clone())),
            EntryOutcome::RateLimited { message } => Some((e, format!("rate limited: {}", message))),
            _ => None,
        })
        .map(|(e, error)| FailureRow {
            entry: e.slug.clone(),
            repository: e.repository.clone().unwrap_or_default(),
            error,
        })
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "### Failures\n");
        let _ = writeln!(out, "{}\n", Table::new(failures).with(Style::markdown()));
    }

    out
}

/// Write the markdown report to `path`, and append it to the CI step summary
/// when one is configured
pub async fn write_report(
    report: &RunReport,
    path: &Path,
    step_summary: Option<&Path>,
) -> Result<(), ApplicationError> {
    let markdown = render_markdown(report, DEFAULT_TOP_CHANGES);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, &markdown).await?;
    info!(path = %path.display(), "wrote sync report");

    if let Some(summary_path) = step_summary {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(summary_path)
            .await?;
        file.write_all(markdown.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %summary_path.display(), "appended report to step summary");
    }
    Ok(())
}
