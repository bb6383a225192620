//! End-to-end sync runs against mock forge servers and a temporary catalog

use mockito::{Matcher, Server, ServerGuard};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use catalog_pulse::application::{
    EntryOutcome, RunStatus, SkipReason, SyncOptions, SyncRunner, render_markdown,
};
use catalog_pulse::infrastructure::{
    FileCatalogRepository, RepositorySourceClient,
    repository_source::{ForgeRouter, GitHubRepositoryClient, GitLabRepositoryClient},
};

fn write_entry(dir: &Path, slug: &str, value: Value) {
    let content = serde_json::to_string_pretty(&value).unwrap() + "\n";
    std::fs::write(dir.join(format!("{}.json", slug)), content).unwrap();
}

fn read_entry(dir: &Path, slug: &str) -> Value {
    let content = std::fs::read_to_string(dir.join(format!("{}.json", slug))).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn router(github: &ServerGuard, gitlab: Option<&ServerGuard>) -> Arc<dyn RepositorySourceClient> {
    let gh = GitHubRepositoryClient::new(
        github.url(),
        Some("test-token".to_string()),
        Duration::from_secs(5),
        "catalog-pulse-tests",
    )
    .unwrap();
    let mut router = ForgeRouter::new().with_github(Arc::new(gh));
    if let Some(server) = gitlab {
        let gl = GitLabRepositoryClient::new(
            server.url(),
            None,
            Duration::from_secs(5),
            "catalog-pulse-tests",
        )
        .unwrap();
        router = router.with_gitlab(Arc::new(gl));
    }
    Arc::new(router)
}

fn runner(catalog: &TempDir, source: Arc<dyn RepositorySourceClient>) -> SyncRunner {
    let repository = Arc::new(FileCatalogRepository::new(
        catalog.path(),
        Duration::from_secs(300),
    ));
    SyncRunner::new(repository, source)
}

async fn mock_github_widget(server: &mut ServerGuard) {
    server
        .mock("GET", "/repos/acme/widget")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "html_url": "https://github.com/acme/widget",
                "archived": false,
                "stargazers_count": 140,
                "homepage": "https://widget.dev",
                "has_issues": true,
                "has_wiki": false,
                "license": { "spdx_id": "Apache-2.0" }
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/repos/acme/widget/releases/latest")
        .with_status(200)
        .with_body(
            json!({ "tag_name": "v1.4.0", "published_at": "2025-05-01T10:00:00Z" }).to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/repos/acme/widget/commits")
        .match_query(Matcher::UrlEncoded("per_page".into(), "1".into()))
        .with_status(200)
        .with_body(
            json!([{ "commit": { "committer": { "date": "2025-06-05T08:30:00Z" } } }])
                .to_string(),
        )
        .create_async()
        .await;
}

async fn mock_gitlab_client(server: &mut ServerGuard) {
    server
        .mock("GET", "/projects/fdroid%2Ffdroidclient")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "web_url": "https://gitlab.com/fdroid/fdroidclient",
                "star_count": 1200,
                "archived": false,
                "last_activity_at": "2025-06-01T12:00:00.000Z",
                "license": { "key": "gpl-3.0" },
                "issues_enabled": true,
                "wiki_enabled": false
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/projects/fdroid%2Ffdroidclient/releases")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!([{ "tag_name": "v1.20.0", "released_at": "2025-04-02T00:00:00Z" }]).to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/projects/fdroid%2Ffdroidclient/repository/commits")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([{ "committed_date": "2025-05-28T16:40:00Z" }]).to_string())
        .create_async()
        .await;
}

#[tokio::test]
async fn sync_updates_mixed_catalog_and_reruns_as_noop() {
    let mut github = Server::new_async().await;
    let mut gitlab = Server::new_async().await;
    mock_github_widget(&mut github).await;
    mock_gitlab_client(&mut gitlab).await;
    github
        .mock("GET", "/repos/acme/ghost")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let catalog = TempDir::new().unwrap();
    write_entry(
        catalog.path(),
        "widget",
        json!({
            "name": "Widget",
            "source_code": "https://github.com/acme/widget",
            "tags": ["tools"],
            "metadata": { "license": "MIT", "version": "v1.3.0", "github_stars": 100 },
            "resources": { "website": "https://curated.example" }
        }),
    );
    write_entry(
        catalog.path(),
        "fdroid",
        json!({ "name": "F-Droid", "source_code": "https://gitlab.com/fdroid/fdroidclient" }),
    );
    write_entry(
        catalog.path(),
        "ghost",
        json!({ "name": "Ghost", "source_code": "https://github.com/acme/ghost" }),
    );
    write_entry(catalog.path(), "notes", json!({ "name": "Notes" }));

    let source = router(&github, Some(&gitlab));
    let options = SyncOptions {
        parallelism: 2,
        ..SyncOptions::default()
    };

    let report = runner(&catalog, source.clone()).run(&options).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.summary.total_entries, 4);
    assert_eq!(report.summary.updated, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.skipped, 1);

    let outcome = |slug: &str| {
        report
            .entries
            .iter()
            .find(|e| e.slug == slug)
            .map(|e| e.outcome.clone())
            .unwrap()
    };
    assert!(matches!(outcome("ghost"), EntryOutcome::Failed { kind, .. } if kind == "not_found"));
    assert_eq!(
        outcome("notes"),
        EntryOutcome::Skipped {
            reason: SkipReason::NoSource
        }
    );

    let widget = read_entry(catalog.path(), "widget");
    assert_eq!(widget["metadata"]["github_stars"], 140);
    assert_eq!(widget["metadata"]["version"], "v1.4.0");
    assert_eq!(widget["metadata"]["license"], "Apache-2.0");
    assert_eq!(widget["metadata"]["date_last_released"], "2025-05-01");
    assert_eq!(widget["metadata"]["date_last_commit"], "2025-06-05");
    assert_eq!(widget["resources"]["website"], "https://curated.example");
    assert_eq!(
        widget["resources"]["issues"],
        "https://github.com/acme/widget/issues"
    );
    assert_eq!(widget["tags"], json!(["tools"]));

    let fdroid = read_entry(catalog.path(), "fdroid");
    assert_eq!(fdroid["metadata"]["github_stars"], 1200);
    assert_eq!(fdroid["metadata"]["version"], "v1.20.0");
    assert_eq!(fdroid["metadata"]["date_last_commit"], "2025-05-28");

    let markdown = render_markdown(&report, 25);
    assert!(markdown.contains("acme/widget"));
    assert!(markdown.contains("### Failures"));

    let before = std::fs::read(catalog.path().join("widget.json")).unwrap();
    let rerun = runner(&catalog, source).run(&options).await.unwrap();
    assert_eq!(rerun.summary.updated, 0);
    assert_eq!(rerun.summary.unchanged, 2);
    assert!(rerun.changes.is_empty());
    assert_eq!(
        std::fs::read(catalog.path().join("widget.json")).unwrap(),
        before
    );
}

#[tokio::test]
async fn sync_stops_when_github_rate_limits() {
    let mut github = Server::new_async().await;
    github
        .mock("GET", Matcher::Regex(r"^/repos/".to_string()))
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "0")
        .with_body(r#"{"message":"API rate limit exceeded"}"#)
        .create_async()
        .await;

    let catalog = TempDir::new().unwrap();
    for i in 0..10 {
        write_entry(
            catalog.path(),
            &format!("entry-{:02}", i),
            json!({
                "name": format!("Entry {}", i),
                "source_code": format!("https://github.com/acme/repo-{}", i),
                "metadata": { "github_stars": 1 }
            }),
        );
    }
    let original = std::fs::read(catalog.path().join("entry-00.json")).unwrap();

    let options = SyncOptions {
        parallelism: 1,
        breaker_threshold: 3,
        ..SyncOptions::default()
    };
    let report = runner(&catalog, router(&github, None))
        .run(&options)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::StoppedRateLimited);
    assert_eq!(report.summary.rate_limited, 3);
    assert_eq!(report.summary.not_processed, 7);
    assert_eq!(report.summary.updated, 0);
    assert!(
        report
            .recommendation
            .as_deref()
            .is_some_and(|r| r.contains("3 of 10"))
    );
    assert_eq!(
        std::fs::read(catalog.path().join("entry-00.json")).unwrap(),
        original
    );
}

#[tokio::test]
async fn missing_catalog_directory_is_fatal() {
    let github = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(FileCatalogRepository::new(
        dir.path().join("absent"),
        Duration::from_secs(300),
    ));
    let result = SyncRunner::new(repository, router(&github, None))
        .run(&SyncOptions::default())
        .await;
    assert!(result.is_err());
}
