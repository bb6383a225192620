//! Batch synchronization of catalog metadata from the forges
//!
//! A run goes through discovery, a bounded concurrent fetch guarded by the
//! rate-limit circuit breaker, per-file write-back and reporting. Every
//! per-entry failure is recorded and the run moves on. The only early exit is
//! the breaker opening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::errors::ApplicationError;
use crate::domain::{
    ChangeRecord, MaintenanceStatus, RepositoryIdentity, RepositorySnapshot, classify,
};
use crate::infrastructure::repositories::{CatalogListing, CatalogRepository, WriteOutcome};
use crate::infrastructure::repository_source::{
    RepositorySourceClient, RepositorySourceError, RepositorySourceResult, parse_repository_url,
};
use crate::infrastructure::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::infrastructure::worker_pool::{StopSignal, WorkerPool};

/// Default parallelism without an auth token
pub const UNAUTHENTICATED_PARALLELISM: usize = 5;
/// Default parallelism with an auth token
pub const AUTHENTICATED_PARALLELISM: usize = 50;

/// How entries map onto upstream fetches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// One fetch per distinct repository, fanned out to every entry using it
    #[default]
    Refresh,
    /// One fetch per entry
    PerEntry,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Refresh => "refresh",
            RunMode::PerEntry => "per-entry",
        }
    }
}

impl FromStr for RunMode {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refresh" => Ok(RunMode::Refresh),
            "per-entry" | "per_entry" | "entry" => Ok(RunMode::PerEntry),
            other => Err(ApplicationError::Configuration {
                message: format!("unknown run mode '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Process only the first N resolved repositories
    pub limit: Option<usize>,
    pub parallelism: usize,
    /// Rate-limited responses tolerated before the run stops
    pub breaker_threshold: u32,
    pub request_timeout: Duration,
    pub mode: RunMode,
    pub dry_run: bool,
    /// Minimum spacing between progress updates
    pub progress_interval: Duration,
}

impl SyncOptions {
    pub fn default_parallelism(authenticated: bool) -> usize {
        if authenticated {
            AUTHENTICATED_PARALLELISM
        } else {
            UNAUTHENTICATED_PARALLELISM
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            limit: None,
            parallelism: UNAUTHENTICATED_PARALLELISM,
            breaker_threshold: 5,
            request_timeout: Duration::from_secs(30),
            mode: RunMode::Refresh,
            dry_run: false,
            progress_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoSource,
    InvalidUrl,
    Unreadable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoSource => "no source",
            SkipReason::InvalidUrl => "invalid url",
            SkipReason::Unreadable => "unreadable",
        }
    }
}

/// What happened to one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Synchronized fields changed and the file was (or, in a dry run, would be) rewritten
    Updated,
    /// Fetched fine, nothing to write
    Unchanged,
    /// Repository has no release or tag; other fields were still synced
    NoReleases { written: bool },
    RateLimited { message: String },
    Failed { kind: String, message: String },
    Skipped { reason: SkipReason },
    /// Still queued when the breaker stopped the run
    NotProcessed,
}

impl EntryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EntryOutcome::Updated => "updated",
            EntryOutcome::Unchanged => "unchanged",
            EntryOutcome::NoReleases { .. } => "no-releases",
            EntryOutcome::RateLimited { .. } => "rate-limited",
            EntryOutcome::Failed { .. } => "error",
            EntryOutcome::Skipped { .. } => "skipped",
            EntryOutcome::NotProcessed => "not-processed",
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(
            self,
            EntryOutcome::Updated | EntryOutcome::NoReleases { written: true }
        )
    }

    fn from_error(error: &RepositorySourceError) -> Self {
        match error {
            RepositorySourceError::RateLimited { message, .. } => EntryOutcome::RateLimited {
                message: message.clone(),
            },
            other => EntryOutcome::Failed {
                kind: other.kind().to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub slug: String,
    pub path: PathBuf,
    pub repository: Option<String>,
    pub outcome: EntryOutcome,
    /// Classification from the fetched snapshot
    pub status: Option<MaintenanceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    StoppedRateLimited,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entries in scope for this run, including skipped ones
    pub total_entries: usize,
    /// Distinct units of upstream work queued
    pub repositories: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub no_releases: usize,
    pub stars_changed: usize,
    pub versions_changed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub not_processed: usize,
    /// Entries beyond the limit, left out of the run entirely
    pub beyond_limit: usize,
}

impl RunSummary {
    /// Entries that received a fetch result
    pub fn processed(&self) -> usize {
        self.updated + self.unchanged + self.no_releases + self.failed + self.rate_limited
    }

    /// Share of `count` over all in-scope entries, 0-100
    pub fn percent(&self, count: usize) -> f64 {
        if self.total_entries == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total_entries as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub mode: RunMode,
    pub dry_run: bool,
    pub parallelism: usize,
    pub summary: RunSummary,
    pub entries: Vec<EntryReport>,
    /// Records for written entries, largest absolute star change first
    pub changes: Vec<ChangeRecord>,
    pub recommendation: Option<String>,
}

impl RunReport {
    pub fn stopped_early(&self) -> bool {
        self.status == RunStatus::StoppedRateLimited
    }
}

/// Observer for run progress. Updates arrive from the single consumer loop.
pub trait SyncProgress: Send + Sync {
    fn started(&self, _repositories: usize) {}
    /// Called once per entry that was skipped at discovery or received a fetch result
    fn entry_finished(&self, _entry: &EntryReport) {}
    /// Throttled to at most one call per `progress_interval`
    fn tick(&self, _done: usize, _total: usize) {}
    fn finished(&self, _report: &RunReport) {}
}

/// Progress observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl SyncProgress for NoProgress {}

/// One upstream fetch and the entries its snapshot applies to
struct WorkUnit {
    identity: RepositoryIdentity,
    targets: Vec<usize>,
}

/// Result of discovery: entry slots plus the work to do
struct Plan {
    entries: Vec<Option<EntryReport>>,
    units: Vec<WorkUnit>,
    beyond_limit: usize,
}

pub struct SyncRunner {
    catalog: Arc<dyn CatalogRepository>,
    source: Arc<dyn RepositorySourceClient>,
    progress: Arc<dyn SyncProgress>,
}

impl SyncRunner {
    pub fn new(catalog: Arc<dyn CatalogRepository>, source: Arc<dyn RepositorySourceClient>) -> Self {
        Self {
            catalog,
            source,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Run one synchronization pass over the catalog
    #[instrument(skip(self, options), fields(mode = options.mode.as_str(), dry_run = options.dry_run))]
    pub async fn run(&self, options: &SyncOptions) -> Result<RunReport, ApplicationError> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let listing = self.catalog.refresh_entries().await?;
        let mut plan = discover(&listing, options);

        let parallelism = options.parallelism.max(1);
        info!(
            run_id = %id,
            entries = listing.files.len(),
            repositories = plan.units.len(),
            parallelism,
            "starting sync run"
        );
        self.progress.started(plan.units.len());
        for skipped in plan.entries.iter().flatten() {
            self.progress.entry_finished(skipped);
        }

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: options.breaker_threshold,
            request_timeout: options.request_timeout,
        }));

        let queue: Vec<(usize, RepositoryIdentity)> = plan
            .units
            .iter()
            .enumerate()
            .map(|(idx, unit)| (idx, unit.identity.clone()))
            .collect();
        let total = queue.len();

        let source = self.source.clone();
        let fetch_breaker = breaker.clone();
        let stop: Arc<dyn StopSignal> = breaker.clone();
        let mut pool = WorkerPool::spawn(queue, parallelism, stop, move |(idx, identity)| {
            let source = source.clone();
            let breaker = fetch_breaker.clone();
            async move {
                let result: RepositorySourceResult<RepositorySnapshot> =
                    breaker.execute(|| source.fetch_snapshot(&identity)).await;
                (idx, result)
            }
        });

        let mut changes = Vec::new();
        let mut done = 0usize;
        let mut last_tick: Option<Instant> = None;
        let now = Utc::now();

        while let Some((idx, result)) = pool.next().await {
            done += 1;
            let unit = &plan.units[idx];
            match &result {
                Ok(_) => debug!(repo = %unit.identity, "fetched"),
                Err(e) => warn!(repo = %unit.identity, error = %e, "fetch failed"),
            }

            for &target in &unit.targets {
                let file = &listing.files[target];
                let report = match &result {
                    Ok(snapshot) => {
                        let (report, change) = self
                            .write_back(target, &listing, &unit.identity, snapshot, options, &now)
                            .await;
                        if let Some(change) = change {
                            changes.push(change);
                        }
                        report
                    }
                    Err(e) => EntryReport {
                        slug: file.entry.slug().to_string(),
                        path: file.path.clone(),
                        repository: Some(unit.identity.full_name()),
                        outcome: EntryOutcome::from_error(e),
                        status: None,
                    },
                };
                self.progress.entry_finished(&report);
                plan.entries[target] = Some(report);
            }

            if last_tick.map_or(true, |t| t.elapsed() >= options.progress_interval) {
                self.progress.tick(done, total);
                last_tick = Some(Instant::now());
            }
        }
        self.progress.tick(done, total);

        for (idx, _) in pool.finish().await {
            for &target in &plan.units[idx].targets {
                let file = &listing.files[target];
                plan.entries[target] = Some(EntryReport {
                    slug: file.entry.slug().to_string(),
                    path: file.path.clone(),
                    repository: Some(plan.units[idx].identity.full_name()),
                    outcome: EntryOutcome::NotProcessed,
                    status: None,
                });
            }
        }

        let open_for = breaker.open_for().await;
        let stopped = open_for.is_some();
        let rate_limit_hits = breaker.get_failure_count().await;
        let entries: Vec<EntryReport> = plan.entries.into_iter().flatten().collect();
        let summary = summarize(&entries, &changes, plan.units.len(), plan.beyond_limit);
        sort_changes(&mut changes);

        let recommendation = stopped.then(|| {
            format!(
                "Stopped after {} rate-limited responses; {} of {} repositories were processed. \
                 Supply an auth token (GITHUB_TOKEN) or lower the parallelism (PARALLEL) and run again.",
                rate_limit_hits,
                done,
                total
            )
        });

        let report = RunReport {
            id,
            started_at,
            finished_at: Utc::now(),
            status: if stopped {
                RunStatus::StoppedRateLimited
            } else {
                RunStatus::Completed
            },
            mode: options.mode,
            dry_run: options.dry_run,
            parallelism,
            summary,
            entries,
            changes,
            recommendation,
        };

        if stopped {
            warn!(
                run_id = %id,
                processed = done,
                total,
                open_secs = open_for.map(|d| d.as_secs_f64()).unwrap_or_default(),
                "sync run stopped by rate limiting"
            );
        } else {
            info!(
                run_id = %id,
                updated = report.summary.updated,
                failed = report.summary.failed,
                skipped = report.summary.skipped,
                "sync run completed"
            );
        }
        self.progress.finished(&report);
        Ok(report)
    }

    /// Apply a snapshot to one entry and persist it
    async fn write_back(
        &self,
        target: usize,
        listing: &CatalogListing,
        identity: &RepositoryIdentity,
        snapshot: &RepositorySnapshot,
        options: &SyncOptions,
        now: &DateTime<Utc>,
    ) -> (EntryReport, Option<ChangeRecord>) {
        let file = &listing.files[target];
        let mut entry = file.entry.clone();
        let change = entry.apply_snapshot(identity, snapshot);
        let status = classify(snapshot.is_archived, snapshot.last_commit_at.as_ref(), now);

        let written = if options.dry_run {
            Ok(entry != file.entry)
        } else {
            self.catalog
                .write_entry(&file.path, &entry)
                .await
                .map(|outcome| outcome == WriteOutcome::Written)
        };

        let outcome = match written {
            Ok(written) if !snapshot.has_release() => EntryOutcome::NoReleases { written },
            Ok(true) => EntryOutcome::Updated,
            Ok(false) => EntryOutcome::Unchanged,
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "write-back failed");
                EntryOutcome::Failed {
                    kind: "write".to_string(),
                    message: e.to_string(),
                }
            }
        };

        let change = outcome.is_written().then_some(change);
        let report = EntryReport {
            slug: file.entry.slug().to_string(),
            path: file.path.clone(),
            repository: Some(identity.full_name()),
            outcome,
            status: Some(status),
        };
        (report, change)
    }
}

/// Resolve identities, record skips, group into work units and apply the limit
fn discover(listing: &CatalogListing, options: &SyncOptions) -> Plan {
    let mut entries: Vec<Option<EntryReport>> = vec![None; listing.files.len()];
    let mut units: Vec<WorkUnit> = Vec::new();
    let mut by_identity: HashMap<RepositoryIdentity, usize> = HashMap::new();

    for (idx, file) in listing.files.iter().enumerate() {
        let skip = |reason| EntryReport {
            slug: file.entry.slug().to_string(),
            path: file.path.clone(),
            repository: None,
            outcome: EntryOutcome::Skipped { reason },
            status: None,
        };

        let Some(url) = file.entry.source_code() else {
            entries[idx] = Some(skip(SkipReason::NoSource));
            continue;
        };
        let Some(identity) = parse_repository_url(url) else {
            debug!(entry = file.entry.slug(), url, "unsupported repository url");
            entries[idx] = Some(skip(SkipReason::InvalidUrl));
            continue;
        };

        match options.mode {
            RunMode::Refresh => match by_identity.get(&identity) {
                Some(&unit) => units[unit].targets.push(idx),
                None => {
                    by_identity.insert(identity.clone(), units.len());
                    units.push(WorkUnit {
                        identity,
                        targets: vec![idx],
                    });
                }
            },
            RunMode::PerEntry => units.push(WorkUnit {
                identity,
                targets: vec![idx],
            }),
        }
    }

    let mut beyond_limit = 0;
    if let Some(limit) = options.limit {
        if units.len() > limit {
            beyond_limit = units[limit..].iter().map(|u| u.targets.len()).sum();
            units.truncate(limit);
        }
    }

    // Unreadable files never become entries but still count as skipped
    entries.extend(listing.unreadable.iter().map(|u| {
        Some(EntryReport {
            slug: u
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: u.path.clone(),
            repository: None,
            outcome: EntryOutcome::Skipped {
                reason: SkipReason::Unreadable,
            },
            status: None,
        })
    }));

    Plan {
        entries,
        units,
        beyond_limit,
    }
}

fn summarize(
    entries: &[EntryReport],
    changes: &[ChangeRecord],
    repositories: usize,
    beyond_limit: usize,
) -> RunSummary {
    let mut summary = RunSummary {
        total_entries: entries.len(),
        repositories,
        beyond_limit,
        stars_changed: changes.iter().filter(|c| c.stars_changed()).count(),
        versions_changed: changes.iter().filter(|c| c.version_changed).count(),
        ..Default::default()
    };
    for entry in entries {
        match &entry.outcome {
            EntryOutcome::Updated => summary.updated += 1,
            EntryOutcome::Unchanged => summary.unchanged += 1,
            EntryOutcome::NoReleases { .. } => summary.no_releases += 1,
            EntryOutcome::RateLimited { .. } => summary.rate_limited += 1,
            EntryOutcome::Failed { .. } => summary.failed += 1,
            EntryOutcome::Skipped { .. } => summary.skipped += 1,
            EntryOutcome::NotProcessed => summary.not_processed += 1,
        }
    }
    summary
}

/// Largest absolute star change first; ties by repository name
fn sort_changes(changes: &mut [ChangeRecord]) {
    changes.sort_by(|a, b| {
        b.star_diff
            .unsigned_abs()
            .cmp(&a.star_diff.unsigned_abs())
            .then_with(|| a.repository.cmp(&b.repository))
    });
}
