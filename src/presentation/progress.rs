//! Terminal progress for batch runs

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::application::{EntryOutcome, EntryReport, RunReport, SyncProgress};

/// Progress observer drawing an indicatif bar on stdout
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(
            Some(0),
            ProgressDrawTarget::stdout(),
        ))
    }

    /// Observer that keeps state but draws nothing
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// One-line marker printed above the bar for each finished entry
pub fn outcome_line(entry: &EntryReport) -> String {
    let target = entry.repository.as_deref().unwrap_or(entry.slug.as_str());
    match &entry.outcome {
        EntryOutcome::Updated => format!("[updated] {}", target),
        EntryOutcome::Unchanged => format!("[unchanged] {}", target),
        EntryOutcome::NoReleases { .. } => format!("[no releases] {}", target),
        EntryOutcome::RateLimited { .. } => format!("[rate limited] {}", target),
        EntryOutcome::Failed { kind, message } => {
            format!("[error] {} ({}): {}", target, kind, message)
        }
        EntryOutcome::Skipped { reason } => format!("[skipped] {}: {}", target, reason.as_str()),
        EntryOutcome::NotProcessed => format!("[not processed] {}", target),
    }
}

impl SyncProgress for ConsoleProgress {
    fn started(&self, repositories: usize) {
        self.bar.set_length(repositories as u64);
        self.bar.set_position(0);
        self.bar.set_message("syncing");
    }

    fn entry_finished(&self, entry: &EntryReport) {
        self.bar.println(outcome_line(entry));
    }

    fn tick(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn finished(&self, report: &RunReport) {
        let message = if report.stopped_early() {
            "stopped: rate limited"
        } else {
            "done"
        };
        self.bar.finish_with_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::SkipReason;
    use std::path::PathBuf;

    fn report(outcome: EntryOutcome) -> EntryReport {
        EntryReport {
            slug: "widget".to_string(),
            path: PathBuf::from("catalog/widget.json"),
            repository: Some("acme/widget".to_string()),
            outcome,
            status: None,
        }
    }

    #[test]
    fn every_outcome_has_its_own_marker() {
        let outcomes = [
            EntryOutcome::Updated,
            EntryOutcome::Unchanged,
            EntryOutcome::NoReleases { written: true },
            EntryOutcome::RateLimited {
                message: "slow down".to_string(),
            },
            EntryOutcome::Failed {
                kind: "network".to_string(),
                message: "reset".to_string(),
            },
            EntryOutcome::Skipped {
                reason: SkipReason::InvalidUrl,
            },
        ];
        let markers: Vec<String> = outcomes
            .into_iter()
            .map(|o| {
                let line = outcome_line(&report(o));
                line[..line.find(']').unwrap() + 1].to_string()
            })
            .collect();
        assert_eq!(
            markers,
            vec![
                "[updated]",
                "[unchanged]",
                "[no releases]",
                "[rate limited]",
                "[error]",
                "[skipped]"
            ]
        );
    }

    #[test]
    fn skipped_line_names_the_reason() {
        let mut entry = report(EntryOutcome::Skipped {
            reason: SkipReason::NoSource,
        });
        entry.repository = None;
        assert_eq!(outcome_line(&entry), "[skipped] widget: no source");
    }

    #[test]
    fn failures_include_kind_and_message() {
        let line = outcome_line(&report(EntryOutcome::Failed {
            kind: "not_found".to_string(),
            message: "repository not found".to_string(),
        }));
        assert_eq!(
            line,
            "[error] acme/widget (not_found): repository not found"
        );
    }

    #[test]
    fn ticks_move_the_bar() {
        let progress = ConsoleProgress::hidden();
        progress.started(10);
        progress.tick(4, 10);
        assert_eq!(progress.position(), 4);
    }
}
