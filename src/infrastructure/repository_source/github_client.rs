//! GitHub repository source client (REST v3)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::http::{build_client, get_json};
use super::{RepositorySourceClient, RepositorySourceError, RepositorySourceResult};
use crate::domain::{RepositoryIdentity, RepositorySnapshot};

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    html_url: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    stargazers_count: u64,
    homepage: Option<String>,
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    has_wiki: bool,
    license: Option<GitHubLicense>,
}

#[derive(Debug, Deserialize)]
struct GitHubLicense {
    spdx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    published_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitHubTag {
    name: String,
    commit: GitHubTagCommit,
}

#[derive(Debug, Deserialize)]
struct GitHubTagCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    commit: GitHubCommitDetail,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    committer: Option<GitHubSignature>,
    author: Option<GitHubSignature>,
}

#[derive(Debug, Deserialize)]
struct GitHubSignature {
    date: Option<DateTime<Utc>>,
}

impl GitHubCommit {
    fn date(&self) -> Option<DateTime<Utc>> {
        self.commit
            .committer
            .as_ref()
            .and_then(|s| s.date)
            .or_else(|| self.commit.author.as_ref().and_then(|s| s.date))
    }
}

/// Latest version marker: a published release or, failing that, a bare tag
#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionMarker {
    tag: String,
    date: Option<DateTime<Utc>>,
}

pub struct GitHubRepositoryClient {
    client: Client,
    base_url: String,
    authenticated: bool,
}

impl GitHubRepositoryClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.github.com";

    /// Build a client. A missing or blank token degrades to unauthenticated
    /// access and its lower rate limit.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> RepositorySourceResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let token = token.filter(|t| !t.trim().is_empty());
        if let Some(t) = &token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", t.trim()))
                .map_err(|e| RepositorySourceError::Configuration(format!("token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client: build_client(user_agent, timeout, headers)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authenticated: token.is_some(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn repo_url(&self, identity: &RepositoryIdentity, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url,
            identity.owner(),
            identity.repo(),
            suffix
        )
    }

    async fn repository(&self, identity: &RepositoryIdentity) -> RepositorySourceResult<GitHubRepo> {
        get_json(&self.client, &self.repo_url(identity, "")).await
    }

    /// Latest release, falling back to the newest tag when the repository
    /// publishes no releases. A tag-only repository still has a version.
    async fn latest_version(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<Option<VersionMarker>> {
        let url = self.repo_url(identity, "/releases/latest");
        match get_json::<GitHubRelease>(&self.client, &url).await {
            Ok(release) => Ok(Some(VersionMarker {
                tag: release.tag_name,
                date: release.published_at.or(release.created_at),
            })),
            Err(RepositorySourceError::NotFound(_)) => {
                debug!(repo = %identity, "no published release, trying tags");
                self.latest_tag(identity).await
            }
            Err(e) => Err(e),
        }
    }

    async fn latest_tag(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<Option<VersionMarker>> {
        let url = self.repo_url(identity, "/tags?per_page=1");
        let tags: Vec<GitHubTag> = match get_json(&self.client, &url).await {
            Ok(tags) => tags,
            Err(RepositorySourceError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(tag) = tags.into_iter().next() else {
            return Ok(None);
        };

        let url = self.repo_url(identity, &format!("/commits/{}", tag.commit.sha));
        let date = match get_json::<GitHubCommit>(&self.client, &url).await {
            Ok(commit) => commit.date(),
            Err(RepositorySourceError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Some(VersionMarker {
            tag: tag.name,
            date,
        }))
    }

    async fn latest_commit_at(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<Option<DateTime<Utc>>> {
        let url = self.repo_url(identity, "/commits?per_page=1");
        match get_json::<Vec<GitHubCommit>>(&self.client, &url).await {
            Ok(commits) => Ok(commits.first().and_then(GitHubCommit::date)),
            // An empty repository answers 409 Conflict
            Err(RepositorySourceError::Api { status: 409, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RepositorySourceClient for GitHubRepositoryClient {
    #[instrument(skip(self), fields(repo = %identity))]
    async fn fetch_snapshot(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<RepositorySnapshot> {
        let repo = self.repository(identity).await?;
        let (version, last_commit_at) = tokio::join!(
            self.latest_version(identity),
            self.latest_commit_at(identity)
        );
        let version = version?;
        let last_commit_at = last_commit_at?;

        let html_url = repo.html_url.trim_end_matches('/').to_string();
        let snapshot = RepositorySnapshot {
            last_commit_at,
            last_release_at: version.as_ref().and_then(|v| v.date),
            latest_version_tag: version.map(|v| v.tag),
            star_count: repo.stargazers_count,
            is_archived: repo.archived,
            homepage_url: repo
                .homepage
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty()),
            license: repo
                .license
                .and_then(|l| l.spdx_id)
                .filter(|id| !id.is_empty() && id != "NOASSERTION"),
            issues_url: repo.has_issues.then(|| format!("{}/issues", html_url)),
            releases_url: Some(format!("{}/releases", html_url)),
            documentation_url: repo.has_wiki.then(|| format!("{}/wiki", html_url)),
        };
        debug!(
            stars = snapshot.star_count,
            archived = snapshot.is_archived,
            version = ?snapshot.latest_version_tag,
            "fetched github snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use chrono::TimeZone;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn identity() -> RepositoryIdentity {
        RepositoryIdentity::new(Platform::GitHub, "acme", "widget").unwrap()
    }

    fn client(server: &ServerGuard, token: Option<&str>) -> GitHubRepositoryClient {
        GitHubRepositoryClient::new(
            server.url(),
            token.map(str::to_string),
            Duration::from_secs(5),
            "catalog-pulse-tests",
        )
        .unwrap()
    }

    fn repo_body(archived: bool) -> String {
        json!({
            "html_url": "https://github.com/acme/widget",
            "archived": archived,
            "stargazers_count": 500,
            "homepage": "https://widget.dev",
            "has_issues": true,
            "has_wiki": false,
            "license": { "spdx_id": "Apache-2.0" }
        })
        .to_string()
    }

    fn commits_body(date: &str) -> String {
        json!([{ "commit": { "committer": { "date": date }, "author": { "date": date } } }])
            .to_string()
    }

    #[tokio::test]
    async fn fetches_full_snapshot() {
        let mut server = Server::new_async().await;
        let repo = server
            .mock("GET", "/repos/acme/widget")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(repo_body(false))
            .create_async()
            .await;
        let release = server
            .mock("GET", "/repos/acme/widget/releases/latest")
            .with_status(200)
            .with_body(
                json!({ "tag_name": "v2.1.0", "published_at": "2025-05-01T10:00:00Z" })
                    .to_string(),
            )
            .create_async()
            .await;
        let commits = server
            .mock("GET", "/repos/acme/widget/commits")
            .match_query(Matcher::UrlEncoded("per_page".into(), "1".into()))
            .with_status(200)
            .with_body(commits_body("2025-06-05T08:30:00Z"))
            .create_async()
            .await;

        let client = client(&server, Some("s3cret"));
        assert!(client.is_authenticated());
        let snapshot = client.fetch_snapshot(&identity()).await.unwrap();

        repo.assert_async().await;
        release.assert_async().await;
        commits.assert_async().await;

        assert_eq!(snapshot.star_count, 500);
        assert!(!snapshot.is_archived);
        assert_eq!(snapshot.latest_version_tag.as_deref(), Some("v2.1.0"));
        assert_eq!(
            snapshot.last_release_at,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            snapshot.last_commit_at,
            Some(Utc.with_ymd_and_hms(2025, 6, 5, 8, 30, 0).unwrap())
        );
        assert_eq!(snapshot.homepage_url.as_deref(), Some("https://widget.dev"));
        assert_eq!(snapshot.license.as_deref(), Some("Apache-2.0"));
        assert_eq!(
            snapshot.issues_url.as_deref(),
            Some("https://github.com/acme/widget/issues")
        );
        assert!(snapshot.documentation_url.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_tags_when_no_release() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget")
            .with_status(200)
            .with_body(repo_body(false))
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widget/releases/latest")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;
        let tags = server
            .mock("GET", "/repos/acme/widget/tags")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "name": "1.4.0", "commit": { "sha": "abc123" } }]).to_string())
            .create_async()
            .await;
        let tag_commit = server
            .mock("GET", "/repos/acme/widget/commits/abc123")
            .with_status(200)
            .with_body(json!({ "commit": { "committer": { "date": "2024-12-24T00:00:00Z" } } }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widget/commits")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(commits_body("2025-01-10T00:00:00Z"))
            .create_async()
            .await;

        let snapshot = client(&server, None)
            .fetch_snapshot(&identity())
            .await
            .unwrap();

        tags.assert_async().await;
        tag_commit.assert_async().await;
        assert_eq!(snapshot.latest_version_tag.as_deref(), Some("1.4.0"));
        assert_eq!(
            snapshot.last_release_at,
            Some(Utc.with_ymd_and_hms(2024, 12, 24, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn no_release_and_no_tags_is_not_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget")
            .with_status(200)
            .with_body(repo_body(true))
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widget/releases/latest")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widget/tags")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widget/commits")
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body(r#"{"message":"Git Repository is empty."}"#)
            .create_async()
            .await;

        let snapshot = client(&server, None)
            .fetch_snapshot(&identity())
            .await
            .unwrap();
        assert!(snapshot.is_archived);
        assert!(snapshot.latest_version_tag.is_none());
        assert!(snapshot.last_release_at.is_none());
        assert!(snapshot.last_commit_at.is_none());
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        let err = client(&server, None)
            .fetch_snapshot(&identity())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositorySourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn rate_limited_repository_call() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "0")
            .with_body(r#"{"message":"API rate limit exceeded for 10.0.0.1."}"#)
            .create_async()
            .await;

        let err = client(&server, None)
            .fetch_snapshot(&identity())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositorySourceError::RateLimited {
                retry_after: Some(0),
                message: "API rate limit exceeded for 10.0.0.1.".into()
            }
        );
    }

    #[tokio::test]
    async fn permission_denied_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "4321")
            .with_body(r#"{"message":"Repository access blocked"}"#)
            .create_async()
            .await;

        let err = client(&server, Some("t"))
            .fetch_snapshot(&identity())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositorySourceError::Api { status: 403, .. }));
    }

    #[test]
    fn blank_token_is_unauthenticated() {
        let client = GitHubRepositoryClient::new(
            GitHubRepositoryClient::DEFAULT_BASE_URL,
            Some("   ".into()),
            Duration::from_secs(1),
            "ua",
        )
        .unwrap();
        assert!(!client.is_authenticated());
    }
}
