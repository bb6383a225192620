//! Catalog Pulse - command-line entry point

use clap::Parser;
use std::{path::Path, process::ExitCode, sync::Arc};

use catalog_pulse::{
    Config,
    application::{
        RunMode, StatusService, StatusServiceImpl, SyncOptions, SyncProgress, SyncRunner,
        write_report,
    },
    domain::MaintenanceStatusView,
    infrastructure::{
        CachingRepositorySource, CatalogRepository, FileCatalogRepository, SnapshotCache,
        read_entry_file,
        repository_source::{
            ForgeRouter, GitHubRepositoryClient, GitLabRepositoryClient, RepositorySourceClient,
        },
    },
    init_tracing,
    presentation::{
        Cli, Command, ConsoleProgress, EntryStatus, StatusArgs, SyncArgs, render_run_summary,
        render_status_table,
    },
};

type BoxError = Box<dyn std::error::Error>;

const EXIT_STOPPED_EARLY: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Sync(args) => run_sync(config, args).await,
        Command::Status(args) => run_status(config, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// GitHub and GitLab clients behind one router
fn build_source(config: &Config) -> Result<(Arc<dyn RepositorySourceClient>, bool), BoxError> {
    let apis = &config.apis;
    let github = GitHubRepositoryClient::new(
        apis.github.base_url.clone(),
        apis.github.token.clone(),
        apis.github.timeout(),
        &apis.user_agent,
    )?;
    let authenticated = github.is_authenticated();
    if !authenticated {
        tracing::info!(
            "GITHUB_TOKEN not provided; using unauthenticated GitHub access with its lower rate limit"
        );
    }
    let gitlab = GitLabRepositoryClient::new(
        apis.gitlab.base_url.clone(),
        apis.gitlab.token.clone(),
        apis.gitlab.timeout(),
        &apis.user_agent,
    )?;

    let router = ForgeRouter::new()
        .with_github(Arc::new(github))
        .with_gitlab(Arc::new(gitlab));
    Ok((Arc::new(router), authenticated))
}

async fn run_sync(mut config: Config, args: SyncArgs) -> Result<ExitCode, BoxError> {
    if let Some(dir) = args.catalog_dir {
        config.catalog.directory = dir;
    }
    if let Some(limit) = args.limit {
        config.sync.limit = Some(limit);
    }
    if let Some(parallelism) = args.parallelism {
        config.sync.parallelism = Some(parallelism);
    }
    if let Some(threshold) = args.breaker_threshold {
        config.sync.breaker_threshold = threshold;
    }
    if let Some(report) = args.report {
        config.sync.report_path = report;
    }

    let (source, authenticated) = build_source(&config)?;
    let mode = match args.mode {
        Some(mode) => RunMode::from(mode),
        None => config.sync.mode.parse::<RunMode>()?,
    };
    let options = SyncOptions {
        limit: config.sync.limit,
        parallelism: config.sync.effective_parallelism(authenticated),
        breaker_threshold: config.sync.breaker_threshold,
        request_timeout: config.sync.request_timeout(),
        mode,
        dry_run: args.dry_run,
        ..SyncOptions::default()
    };

    tracing::info!(
        catalog = %config.catalog.directory.display(),
        github_token = config.has_github_token(),
        parallelism = options.parallelism,
        mode = mode.as_str(),
        "starting catalog sync"
    );

    let catalog = Arc::new(FileCatalogRepository::new(
        config.catalog.directory.clone(),
        config.cache.list_ttl(),
    ));
    let progress: Arc<dyn SyncProgress> = if args.quiet || args.json {
        Arc::new(ConsoleProgress::hidden())
    } else {
        Arc::new(ConsoleProgress::new())
    };
    let runner = SyncRunner::new(catalog, source).with_progress(progress);
    let report = runner.run(&options).await?;

    write_report(
        &report,
        &config.sync.report_path,
        config.sync.step_summary_path.as_deref(),
    )
    .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_run_summary(&report));
    }

    if report.stopped_early() {
        Ok(ExitCode::from(EXIT_STOPPED_EARLY))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_status(mut config: Config, args: StatusArgs) -> Result<ExitCode, BoxError> {
    if let Some(dir) = args.catalog_dir {
        config.catalog.directory = dir;
    }

    let (forge, _) = build_source(&config)?;
    let cache = Arc::new(SnapshotCache::new(config.cache.status_ttl()));
    let source = Arc::new(CachingRepositorySource::new(
        forge,
        cache,
        config.cache.single_flight,
    ));
    let service = StatusServiceImpl::new(source);

    let mut items = Vec::new();
    if args.all {
        let catalog =
            FileCatalogRepository::new(config.catalog.directory.clone(), config.cache.list_ttl());
        let listing = catalog.list_entries().await?;
        for file in &listing.files {
            items.push(EntryStatus {
                slug: file.entry.slug().to_string(),
                source_code: file.entry.source_code().map(str::to_string),
                view: service.get_status(&file.entry).await,
            });
        }
    } else {
        for path in &args.entries {
            items.push(status_for_file(&service, path).await);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        println!("{}", render_status_table(&items));
    }
    Ok(ExitCode::SUCCESS)
}

/// Unreadable files still produce a row, as an `unknown` view
async fn status_for_file(service: &StatusServiceImpl, path: &Path) -> EntryStatus {
    match read_entry_file(path).await {
        Ok(entry) => EntryStatus {
            slug: entry.slug().to_string(),
            source_code: entry.source_code().map(str::to_string),
            view: service.get_status(&entry).await,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read entry");
            EntryStatus {
                slug: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                source_code: None,
                view: MaintenanceStatusView::unknown(e.to_string()),
            }
        }
    }
}
