//! Console rendering for command results

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::application::RunReport;
use crate::domain::MaintenanceStatusView;

/// Status view tagged with the entry it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub slug: String,
    pub source_code: Option<String>,
    #[serde(flatten)]
    pub view: MaintenanceStatusView,
}

#[derive(Debug, Tabled)]
struct StatusRow {
    #[tabled(rename = "Entry")]
    entry: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last commit")]
    last_commit: String,
    #[tabled(rename = "Source")]
    origin: String,
}

fn status_row(item: &EntryStatus) -> StatusRow {
    let view = &item.view;
    StatusRow {
        entry: item.slug.clone(),
        status: format!("{} {}", view.icon, view.message),
        last_commit: match (&view.relative_time, &view.error) {
            (Some(relative), _) => relative.clone(),
            (None, Some(error)) => error.clone(),
            (None, None) => "-".to_string(),
        },
        origin: serde_json::to_value(view.origin)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
    }
}

/// Status table for interactive lookups
pub fn render_status_table(items: &[EntryStatus]) -> String {
    if items.is_empty() {
        return "(no entries)".to_string();
    }
    let rows: Vec<StatusRow> = items.iter().map(status_row).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Short plain-text run summary printed after a sync
pub fn render_run_summary(report: &RunReport) -> String {
    let s = &report.summary;
    let mut lines = vec![format!(
        "{} entries, {} repositories: {} updated, {} unchanged, {} without releases, {} skipped, {} failed, {} rate limited, {} not processed",
        s.total_entries,
        s.repositories,
        s.updated,
        s.unchanged,
        s.no_releases,
        s.skipped,
        s.failed,
        s.rate_limited,
        s.not_processed,
    )];
    if report.dry_run {
        lines.push("Dry run: no entry files were written.".to_string());
    }
    if let Some(recommendation) = &report.recommendation {
        lines.push(recommendation.clone());
    }
    lines.join("\n")
}
