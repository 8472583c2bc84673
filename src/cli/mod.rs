//! Command-line interface for DocBro crawl operations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::config::CrawlConfig;
use crate::crawl_engine::{BatchOrchestrator, CrawlEngine, ErrorSink, LogProgress};
use crate::models::CrawlStatus;
use crate::reporting::ErrorReporter;
use crate::session_store::SessionStore;

/// Default depth for projects created on the fly via `crawl <name> --url`.
const DEFAULT_CRAWL_DEPTH: u32 = 3;
const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";

#[derive(Parser)]
#[command(name = "docbro")]
#[command(about = "Documentation crawler with session tracking and batch orchestration")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl one project, or all projects with --all --update
    Crawl(CrawlArgs),
}

#[derive(Args)]
pub struct CrawlArgs {
    /// Project name to crawl
    #[arg(required_unless_present = "all")]
    pub name: Option<String>,

    /// Seed URL; creates the project when it does not exist yet
    #[arg(long)]
    pub url: Option<String>,

    /// Maximum pages to crawl
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// Requests per second per origin
    #[arg(long, default_value_t = 1.0)]
    pub rate_limit: f64,

    /// Crawl depth for newly created projects
    #[arg(long)]
    pub depth: Option<u32>,

    /// Re-crawl existing project content
    #[arg(long)]
    pub update: bool,

    /// Crawl every stored project sequentially; requires --update
    #[arg(long, requires = "update")]
    pub all: bool,

    /// Verbose debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Entry point used by `main`. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Crawl(args) => run_crawl(args).await,
    }
}

async fn run_crawl(args: CrawlArgs) -> Result<i32> {
    let config = CrawlConfig::builder()
        .rate_limit_rps(args.rate_limit)
        .max_pages(args.max_pages)
        .build()?;

    let data_dir = config.resolved_data_dir();
    let store = SessionStore::open(&store_path(&data_dir)).await?;

    if args.all {
        run_batch_crawl(&store, config, &args).await
    } else {
        let name = args.name.as_deref().expect("clap enforces name without --all");
        run_single_crawl(&store, config, name, &args).await
    }
}

async fn run_batch_crawl(
    store: &SessionStore,
    config: CrawlConfig,
    args: &CrawlArgs,
) -> Result<i32> {
    let mut orchestrator = BatchOrchestrator::new(store.clone(), config)
        .with_progress(Arc::new(LogProgress));
    let summary = orchestrator
        .crawl_all(None, args.max_pages, args.rate_limit, true)
        .await?;

    println!("{}", BatchOrchestrator::format_summary(&summary));
    Ok(if summary.failed == 0 { 0 } else { 1 })
}

async fn run_single_crawl(
    store: &SessionStore,
    config: CrawlConfig,
    name: &str,
    args: &CrawlArgs,
) -> Result<i32> {
    let project = match store.get_project_by_name(name).await? {
        Some(project) => project,
        None => {
            let Some(url) = args.url.as_deref() else {
                bail!("project '{name}' does not exist; pass --url to create it");
            };
            info!("creating project {name} with seed {url}");
            store
                .create_project(
                    name,
                    url,
                    args.depth.unwrap_or(DEFAULT_CRAWL_DEPTH),
                    DEFAULT_EMBEDDING_MODEL,
                )
                .await?
        }
    };

    let reporter = Arc::new(ErrorReporter::with_base_dir(
        name,
        config.resolved_data_dir(),
    ));
    let engine = CrawlEngine::new(store.clone(), config);

    let session = engine
        .start_crawl(
            &project.id,
            None,
            args.rate_limit,
            args.max_pages,
            Arc::new(LogProgress),
            reporter.clone(),
        )
        .await?;
    let session = engine.wait_for_completion(&session.id, None).await?;
    engine.cleanup().await;

    reporter.update_stats(
        Some(session.pages_crawled + session.pages_failed + session.pages_skipped),
        Some(session.pages_crawled),
        None,
        None,
    );

    let report_path = if reporter.has_errors() {
        let (json_path, _) = reporter
            .save_report()
            .context("failed to save error report")?;
        Some(json_path)
    } else {
        None
    };

    let banner = banner_status(&session.status, session.pages_crawled, session.error_count);
    println!(
        "Crawl {banner}: {} pages crawled, {} failed, {} skipped",
        session.pages_crawled, session.pages_failed, session.pages_skipped
    );
    if let Some(path) = &report_path {
        println!("Error report: {}", path.display());
    }

    let failed =
        session.status == CrawlStatus::Failed || (session.pages_crawled == 0 && session.error_count > 0);
    Ok(if failed { 1 } else { 0 })
}

fn banner_status(status: &CrawlStatus, pages_crawled: u64, error_count: u64) -> &'static str {
    if *status == CrawlStatus::Failed || (pages_crawled == 0 && error_count > 0) {
        "FAILED"
    } else if error_count > 0 {
        "PARTIAL"
    } else {
        "SUCCESS"
    }
}

fn store_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("docbro.db")
}
