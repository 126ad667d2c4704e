//! `republish`: fetch WeChat articles, translate them and publish them as
//! Markdown posts.
//!
//! Exit status: 0 when every article was skipped or processed, 1 when any
//! article failed, 2 when the run could not start or the state file could not
//! be updated.
mod cli;
mod config;
mod report;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use engine_logging::{engine_error, engine_info, LogDestination};
use republish_engine::{
    BatchReport, GitCommitter, Glossary, LibreTranslateService, NoCommit, Pipeline,
    PipelineSettings, ReqwestFetcher, Services, StateManager, VersionControl,
};

use crate::cli::{collect_urls, Args};
use crate::config::AppConfig;

const EXIT_ARTICLE_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = <Args as clap::Parser>::parse();

    let destination = match &args.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Stderr,
    };
    engine_logging::initialize(destination, engine_logging::level_from_verbosity(args.verbose));

    match run(&args).await {
        Ok(report) => {
            for article in &report.articles {
                println!("{}", report::status_line(article));
            }
            engine_info!("{}", report::summary_line(&report));
            if let Some(err) = &report.fatal {
                eprintln!("error: run stopped, state could not be updated: {err}");
                ExitCode::from(EXIT_FATAL)
            } else if report.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_ARTICLE_FAILED)
            }
        }
        Err(err) => {
            engine_error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: &Args) -> Result<BatchReport> {
    let urls = collect_urls(&args.urls, args.batch.as_deref())?;
    if urls.is_empty() {
        bail!("no source URLs given (pass URLs or --batch <file>)");
    }

    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_overrides(args)?;

    let glossary = match &config.glossary_file {
        Some(path) => {
            let path = config.resolve(path);
            Glossary::load(&path).with_context(|| format!("cannot load glossary {}", path.display()))?
        }
        None => Glossary::default(),
    };

    let state_path = config.resolve(&config.state_file);
    let state = StateManager::open(&state_path)
        .with_context(|| format!("refusing to run with state file {}", state_path.display()))?;

    let translation = LibreTranslateService::new(config.translator_settings())
        .context("cannot set up translation client")?;
    let vcs: Arc<dyn VersionControl> = if config.commit {
        Arc::new(GitCommitter::new(config.content_root.clone()))
    } else {
        Arc::new(NoCommit)
    };
    let services = Services {
        page_fetcher: Arc::new(ReqwestFetcher::new(config.page_fetch_settings())),
        image_fetcher: Arc::new(ReqwestFetcher::new(config.image_fetch_settings())),
        translation: Arc::new(translation),
        vcs,
    };
    let settings = PipelineSettings {
        content_root: config.content_root.clone(),
        posts_dir: config.posts_dir.clone(),
        staging_dir: config.resolve(&config.staging_dir),
        concurrency: config.concurrency,
        tags: config.default_tags.clone(),
        retry: config.retry_policy(),
        images: config.image_settings(),
        glossary,
    };

    let pipeline = Pipeline::new(settings, state, services);
    Ok(pipeline.run_batch(&urls).await)
}
