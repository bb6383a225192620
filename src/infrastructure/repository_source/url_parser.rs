//! Resolve source-code URLs into repository identities
//!
//! Matching is driven by an ordered rule table. Each rule pairs a regex with
//! the platform it identifies; the first matching rule wins. Supporting a new
//! forge means adding a `Platform` variant and a rule here.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{Platform, RepositoryIdentity};

struct PlatformRule {
    pattern: Regex,
    platform: Platform,
}

/// Builds the rule table. Patterns run against the input with the scheme,
/// userinfo and `www.` already stripped, so they start at the host.
fn rules() -> &'static [PlatformRule] {
    static RULES: OnceLock<Vec<PlatformRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"^github\.com[/:](?P<owner>[^/\s]+)/(?P<repo>[^/\s]+)", Platform::GitHub),
            (r"^gitlab\.com[/:](?P<owner>[^/\s]+)/(?P<repo>[^/\s]+)", Platform::GitLab),
        ]
        .into_iter()
        .filter_map(|(pattern, platform)| match Regex::new(pattern) {
            Ok(pattern) => Some(PlatformRule { pattern, platform }),
            Err(e) => {
                tracing::error!(error = %e, pattern, "invalid repository URL rule");
                None
            }
        })
        .collect()
    })
}

/// Strip everything before the host: scheme, `git@`-style userinfo and `www.`
fn strip_to_host(input: &str) -> &str {
    let mut rest = input.trim();
    for scheme in ["https://", "http://", "ssh://", "git://"] {
        if let Some(stripped) = rest
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &rest[scheme.len()..])
        {
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = rest.strip_prefix("git@") {
        rest = stripped;
    }
    if rest.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("www.")) {
        rest = &rest[4..];
    }
    rest
}

/// Parse a repository URL into a normalized identity.
///
/// Accepted forms include:
/// - `https://github.com/owner/repo`
/// - `http://www.github.com/owner/repo.git`
/// - `github.com/owner/repo/tree/main/src` (extra segments are dropped)
/// - `git@gitlab.com:owner/repo.git`
///
/// Returns `None` for unsupported hosts and malformed input. Callers treat
/// `None` as a permanent skip.
pub fn parse_repository_url(input: &str) -> Option<RepositoryIdentity> {
    let rest = strip_to_host(input);
    let rest = rest
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    rules().iter().find_map(|rule| {
        let caps = rule.pattern.captures(&rest)?;
        let owner = caps.name("owner")?.as_str();
        let repo = caps.name("repo")?.as_str();
        RepositoryIdentity::new(rule.platform, owner, repo).ok()
    })
}
