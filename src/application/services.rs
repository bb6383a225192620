//! Interactive status service

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{CatalogEntry, MaintenanceStatusView, MetadataSource, StatusOrigin};
use crate::infrastructure::repository_source::{RepositorySourceClient, parse_repository_url};

/// Service resolving the maintenance status shown for a catalog entry
#[async_trait]
pub trait StatusService: Send + Sync {
    /// Always returns a view; failures degrade to `unknown` with a message
    async fn get_status(&self, entry: &CatalogEntry) -> MaintenanceStatusView;
}

/// Resolves status from synced metadata, then the legacy status block, and
/// only then from the forge. `source` is expected to be the caching source so
/// repeated lookups within the TTL stay off the network.
pub struct StatusServiceImpl {
    source: Arc<dyn RepositorySourceClient>,
}

impl StatusServiceImpl {
    pub fn new(source: Arc<dyn RepositorySourceClient>) -> Self {
        Self { source }
    }

    /// Same as [`StatusService::get_status`] with an explicit clock
    pub async fn get_status_at(
        &self,
        entry: &CatalogEntry,
        now: &DateTime<Utc>,
    ) -> MaintenanceStatusView {
        match entry.metadata_source() {
            MetadataSource::SyncedMetadata {
                last_commit_at,
                is_archived,
            } => MaintenanceStatusView::classified(
                is_archived,
                Some(last_commit_at),
                now,
                StatusOrigin::SyncedMetadata,
            ),
            MetadataSource::LegacyStatus {
                last_commit_at,
                is_archived,
            } => MaintenanceStatusView::classified(
                is_archived,
                last_commit_at,
                now,
                StatusOrigin::LegacyStatus,
            ),
            MetadataSource::Unknown => self.live_status(entry, now).await,
        }
    }

    async fn live_status(&self, entry: &CatalogEntry, now: &DateTime<Utc>) -> MaintenanceStatusView {
        let Some(url) = entry.source_code() else {
            return MaintenanceStatusView::unknown("entry has no source_code");
        };
        let Some(identity) = parse_repository_url(url) else {
            return MaintenanceStatusView::unknown(format!("unsupported repository url: {}", url));
        };

        debug!(entry = entry.slug(), repo = %identity, "no synced metadata, fetching live");
        match self.source.fetch_snapshot(&identity).await {
            Ok(snapshot) => MaintenanceStatusView::classified(
                snapshot.is_archived,
                snapshot.last_commit_at,
                now,
                StatusOrigin::LiveFetch,
            ),
            Err(e) => {
                warn!(entry = entry.slug(), repo = %identity, error = %e, "live status fetch failed");
                MaintenanceStatusView::unknown(e.to_string())
            }
        }
    }
}

#[async_trait]
impl StatusService for StatusServiceImpl {
    async fn get_status(&self, entry: &CatalogEntry) -> MaintenanceStatusView {
        self.get_status_at(entry, &Utc::now()).await
    }
}
