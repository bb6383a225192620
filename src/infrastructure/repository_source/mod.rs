//! Repository Source Abstractions
//!
//! Provides a trait for fetching repository snapshots from a source forge
//! (GitHub, GitLab) together with the concrete clients and a router that
//! dispatches on the identity's platform.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod github_client;
pub mod gitlab_client;
pub mod http;
pub mod url_parser;
pub use github_client::GitHubRepositoryClient;
pub use gitlab_client::GitLabRepositoryClient;
pub use url_parser::parse_repository_url;

use crate::domain::{Platform, RepositoryIdentity, RepositorySnapshot};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositorySourceError {
    #[error("invalid repository url: {0}")]
    InvalidUrl(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: retry_after={retry_after:?} message={message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RepositorySourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RepositorySourceError::RateLimited { .. })
    }

    /// Short machine-friendly label used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            RepositorySourceError::InvalidUrl(_) => "invalid_url",
            RepositorySourceError::NotFound(_) => "not_found",
            RepositorySourceError::RateLimited { .. } => "rate_limited",
            RepositorySourceError::Network(_) => "network",
            RepositorySourceError::Api { .. } => "api",
            RepositorySourceError::Decode(_) => "decode",
            RepositorySourceError::Configuration(_) => "configuration",
        }
    }
}

pub type RepositorySourceResult<T> = Result<T, RepositorySourceError>;

#[async_trait]
pub trait RepositorySourceClient: Send + Sync {
    /// Fetch a fresh snapshot of one repository
    async fn fetch_snapshot(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<RepositorySnapshot>;
}

/// Dispatches each identity to the client registered for its platform
#[derive(Clone, Default)]
pub struct ForgeRouter {
    github: Option<Arc<dyn RepositorySourceClient>>,
    gitlab: Option<Arc<dyn RepositorySourceClient>>,
}

impl ForgeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_github(mut self, client: Arc<dyn RepositorySourceClient>) -> Self {
        self.github = Some(client);
        self
    }

    pub fn with_gitlab(mut self, client: Arc<dyn RepositorySourceClient>) -> Self {
        self.gitlab = Some(client);
        self
    }

    fn client_for(&self, platform: Platform) -> Option<&Arc<dyn RepositorySourceClient>> {
        match platform {
            Platform::GitHub => self.github.as_ref(),
            Platform::GitLab => self.gitlab.as_ref(),
        }
    }
}

#[async_trait]
impl RepositorySourceClient for ForgeRouter {
    async fn fetch_snapshot(
        &self,
        identity: &RepositoryIdentity,
    ) -> RepositorySourceResult<RepositorySnapshot> {
        match self.client_for(identity.platform()) {
            Some(client) => client.fetch_snapshot(identity).await,
            None => Err(RepositorySourceError::Configuration(format!(
                "no client configured for {}",
                identity.platform()
            ))),
        }
    }
}
