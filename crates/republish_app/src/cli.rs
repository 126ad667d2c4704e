use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use republish_engine::dedup_urls;

/// Republish WeChat articles as English Markdown posts.
#[derive(Parser, Debug)]
#[command(name = "republish", author, version, about, long_about = None)]
pub struct Args {
    /// Source article URLs.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// File with one URL per line; blank lines and `#` comments are ignored.
    #[arg(long, value_name = "FILE")]
    pub batch: Option<PathBuf>,

    /// Configuration file (default: ./republish.ron if present).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write artifacts without committing them.
    #[arg(long)]
    pub no_commit: bool,

    /// Articles processed at the same time.
    #[arg(long, value_name = "N", value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Root of the blog repository.
    #[arg(long, value_name = "DIR")]
    pub content_root: Option<PathBuf>,

    /// Repeat for more detail (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write the log to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}

/// URLs from a batch file body.
pub fn parse_batch(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Positional URLs first, then the batch file's, without repeats.
pub fn collect_urls(positional: &[String], batch: Option<&Path>) -> Result<Vec<String>> {
    let mut urls = positional.to_vec();
    if let Some(path) = batch {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read batch file {}", path.display()))?;
        urls.extend(parse_batch(&content));
    }
    Ok(dedup_urls(&urls))
}
