//! GitLab repository source client (API v4)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::http::{build_client, get_json};
use super::{RepositorySourceClient, RepositorySourceError, RepositorySourceResult};
use crate::domain::{RepositoryIdentity, RepositorySnapshot};

#[derive(Debug, Deserialize)]
struct GitLabProject {
    web_url: String,
    #[serde(default)]
    star_count: u64,
    #[serde(default)]
    archived: bool,
    last_activity_at: Option<DateTime<Utc>>,
    license: Option<GitLabLicense>,
    #[serde(default)]
    issues_enabled: bool,
    #[serde(default)]
    wiki_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct GitLabCommit {
    committed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitLabLicense {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabRelease {
    tag_name: String,
    released_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

pub struct GitLabRepositoryClient {
    client: Client,
    base_url: String,
}

impl GitLabRepositoryClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://gitlab.com/api/v4";

    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> RepositorySourceResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(t) = token.filter(|t| !t.trim().is_empty()) {
            let mut value = HeaderValue::from_str(t.trim())
                .map_err(|e| RepositorySourceError::Configuration(format!("token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert("private-token", value);
        }

        Ok(Self {
            client: build_client(user_agent, timeout, headers)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Projects are addressed by their url-encoded `namespace/name` path
    fn project_url(&self, identity: &RepositoryIdentity, suffix: &str) -> String {
        format!(
            "{}/projects/{}{}",
            self.base_url,
            urlencoding::encode(&identity.full_name()),
            suffix
        )
    }

    async fn latest_release(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<Option<GitLabRelease>> {
        let url = self.project_url(identity, "/releases?per_page=1");
        match get_json::<Vec<GitLabRelease>>(&self.client, &url).await {
            Ok(releases) => Ok(releases.into_iter().next()),
            // Releases disabled on the project
            Err(RepositorySourceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Commit date of the default branch head
    async fn latest_commit_at(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<Option<DateTime<Utc>>> {
        let url = self.project_url(identity, "/repository/commits?per_page=1");
        match get_json::<Vec<GitLabCommit>>(&self.client, &url).await {
            Ok(commits) => Ok(commits.into_iter().next().and_then(|c| c.committed_date)),
            // Empty repository or repository feature disabled
            Err(RepositorySourceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RepositorySourceClient for GitLabRepositoryClient {
    #[instrument(skip(self), fields(repo = %identity))]
    async fn fetch_snapshot(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<RepositorySnapshot> {
        let project: GitLabProject =
            get_json(&self.client, &self.project_url(identity, "?license=true")).await?;
        let (release, last_commit_at) = tokio::join!(
            self.latest_release(identity),
            self.latest_commit_at(identity)
        );
        let release = release?;
        // `last_activity_at` also moves on issue and merge request activity,
        // so it only stands in when no commit date is available
        let last_commit_at = last_commit_at?.or(project.last_activity_at);

        let web_url = project.web_url.trim_end_matches('/').to_string();
        let snapshot = RepositorySnapshot {
            last_commit_at,
            last_release_at: release.as_ref().and_then(|r| r.released_at.or(r.created_at)),
            latest_version_tag: release.map(|r| r.tag_name),
            star_count: project.star_count,
            is_archived: project.archived,
            homepage_url: None,
            license: project
                .license
                .and_then(|l| l.key)
                .filter(|k| !k.is_empty()),
            issues_url: project
                .issues_enabled
                .then(|| format!("{}/-/issues", web_url)),
            releases_url: Some(format!("{}/-/releases", web_url)),
            documentation_url: project
                .wiki_enabled
                .then(|| format!("{}/-/wikis/home", web_url)),
        };
        debug!(
            stars = snapshot.star_count,
            archived = snapshot.is_archived,
            version = ?snapshot.latest_version_tag,
            "fetched gitlab snapshot"
        );
        Ok(snapshot)
    }
}
