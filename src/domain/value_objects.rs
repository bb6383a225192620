//! Domain value objects representing immutable concepts

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;

/// Supported source-forge platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    GitHub,
    GitLab,
}

impl Platform {
    /// Lowercase platform name used in cache keys and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::GitLab => "gitlab",
        }
    }

    /// Public web host of the platform
    pub fn host(&self) -> &'static str {
        match self {
            Platform::GitHub => "github.com",
            Platform::GitLab => "gitlab.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::GitHub => write!(f, "GitHub"),
            Platform::GitLab => write!(f, "GitLab"),
        }
    }
}

impl FromStr for Platform {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(Platform::GitHub),
            "gitlab" => Ok(Platform::GitLab),
            other => Err(DomainError::InvalidIdentity {
                reason: format!("unsupported platform '{}'", other),
            }),
        }
    }
}

/// Normalized identity of an upstream repository.
///
/// Owner and repository names are stored lowercased, so two URLs that differ
/// only by protocol, `www.`, casing or a trailing `.git` produce equal
/// identities. This is the deduplication and cache key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    platform: Platform,
    owner: String,
    repo: String,
}

impl RepositoryIdentity {
    /// Create a new identity, normalizing and validating its components
    pub fn new(
        platform: Platform,
        owner: impl AsRef<str>,
        repo: impl AsRef<str>,
    ) -> Result<Self, DomainError> {
        let owner = owner.as_ref().trim().trim_matches('/').to_lowercase();
        let repo = repo.as_ref().trim().trim_matches('/');
        let repo = repo.strip_suffix(".git").unwrap_or(repo).to_lowercase();

        if owner.is_empty() || repo.is_empty() {
            return Err(DomainError::InvalidIdentity {
                reason: "owner and repository must not be empty".to_string(),
            });
        }
        if owner.contains(char::is_whitespace) || repo.contains(char::is_whitespace) {
            return Err(DomainError::InvalidIdentity {
                reason: format!("whitespace in '{}/{}'", owner, repo),
            });
        }

        Ok(Self {
            platform,
            owner,
            repo,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `owner/repo` path as used by both forge APIs
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Canonical web URL of the repository
    pub fn web_url(&self) -> String {
        format!("https://{}/{}/{}", self.platform.host(), self.owner, self.repo)
    }

    /// Stable string key, e.g. `github:rust-lang/cargo`
    pub fn cache_key(&self) -> String {
        format!("{}:{}/{}", self.platform.as_str(), self.owner, self.repo)
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}

/// Upstream facts about one repository as of a single fetch.
///
/// A snapshot is always built from one fetch; it is never merged with older
/// data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub last_commit_at: Option<DateTime<Utc>>,
    pub last_release_at: Option<DateTime<Utc>>,
    pub latest_version_tag: Option<String>,
    pub star_count: u64,
    pub is_archived: bool,
    pub homepage_url: Option<String>,
    /// SPDX identifier (GitHub) or license key (GitLab)
    pub license: Option<String>,
    pub issues_url: Option<String>,
    pub releases_url: Option<String>,
    pub documentation_url: Option<String>,
}

impl RepositorySnapshot {
    pub fn has_release(&self) -> bool {
        self.latest_version_tag.is_some()
    }
}

/// Format a timestamp the way catalog entries store dates (`YYYY-MM-DD`)
pub fn format_catalog_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a catalog date field.
///
/// Accepts plain `YYYY-MM-DD` dates (interpreted as midnight UTC) and full
/// RFC 3339 timestamps, which older entries still carry.
pub fn parse_catalog_date(field: &str, value: &str) -> Result<DateTime<Utc>, DomainError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DomainError::InvalidDate {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identity_normalizes_case_and_git_suffix() {
        let a = RepositoryIdentity::new(Platform::GitHub, "Rust-Lang", "Cargo.git").unwrap();
        let b = RepositoryIdentity::new(Platform::GitHub, "rust-lang", "cargo").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), "github:rust-lang/cargo");
        assert_eq!(a.web_url(), "https://github.com/rust-lang/cargo");
    }

    #[test]
    fn identity_rejects_empty_components() {
        assert!(RepositoryIdentity::new(Platform::GitLab, "", "repo").is_err());
        assert!(RepositoryIdentity::new(Platform::GitLab, "owner", ".git").is_err());
    }

    #[test]
    fn platform_round_trips_through_str() {
        assert_eq!("GitLab".parse::<Platform>().unwrap(), Platform::GitLab);
        assert!("bitbucket".parse::<Platform>().is_err());
    }

    #[test]
    fn parses_plain_and_rfc3339_dates() {
        let plain = parse_catalog_date("date_last_commit", "2024-03-05").unwrap();
        assert_eq!(plain, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());

        let full = parse_catalog_date("date_last_commit", "2024-03-05T10:11:12Z").unwrap();
        assert_eq!(full, Utc.with_ymd_and_hms(2024, 3, 5, 10, 11, 12).unwrap());
        assert_eq!(format_catalog_date(&full), "2024-03-05");

        assert!(parse_catalog_date("date_last_commit", "last tuesday").is_err());
    }
}
