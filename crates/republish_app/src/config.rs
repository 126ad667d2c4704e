//! `republish.ron` configuration. Every field has a default, so a partial file
//! (or no file at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use engine_logging::engine_info;
use republish_engine::{FetchSettings, ImageSettings, RetryPolicy, TranslatorSettings};
use serde::Deserialize;

use crate::cli::Args;

pub const DEFAULT_CONFIG_FILE: &str = "republish.ron";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Root of the blog repository. Other relative paths resolve against it.
    pub content_root: PathBuf,
    pub posts_dir: String,
    pub assets_dir: PathBuf,
    pub image_url_prefix: String,
    pub state_file: PathBuf,
    pub staging_dir: PathBuf,
    pub glossary_file: Option<PathBuf>,
    pub default_tags: Vec<String>,
    pub concurrency: usize,
    pub commit: bool,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub translator: TranslatorConfig,
    pub images: ImagesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("."),
            posts_dir: "posts".to_string(),
            assets_dir: PathBuf::from("public/images/posts"),
            image_url_prefix: "/images/posts".to_string(),
            state_file: PathBuf::from(".republish/state.ron"),
            staging_dir: PathBuf::from(".republish/staged"),
            glossary_file: None,
            default_tags: Vec::new(),
            concurrency: 2,
            commit: true,
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            translator: TranslatorConfig::default(),
            images: ImagesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub max_page_bytes: u64,
    pub max_image_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let pages = FetchSettings::for_pages();
        let images = FetchSettings::for_images();
        Self {
            connect_timeout_secs: pages.connect_timeout.as_secs(),
            request_timeout_secs: pages.request_timeout.as_secs(),
            redirect_limit: pages.redirect_limit,
            max_page_bytes: pages.max_bytes,
            max_image_bytes: images.max_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub max_chars_per_call: usize,
    pub request_timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        let settings = TranslatorSettings::default();
        Self {
            endpoint: settings.endpoint,
            api_key: settings.api_key,
            source_lang: settings.source_lang,
            target_lang: settings.target_lang,
            max_chars_per_call: settings.max_chars_per_call,
            request_timeout_secs: settings.request_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub max_width: u32,
    pub jpeg_quality: u8,
    pub placeholder: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        let settings = ImageSettings::new(PathBuf::new());
        Self {
            max_width: settings.max_width,
            jpeg_quality: settings.jpeg_quality,
            placeholder: settings.placeholder,
        }
    }
}

impl AppConfig {
    /// Reads `explicit` if given, otherwise `republish.ron` in the working
    /// directory if present, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        engine_info!("loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Command-line flags win over the file. Paths given on the command line
    /// are taken relative to the working directory, and the content root ends
    /// up absolute either way.
    pub fn apply_overrides(&mut self, args: &Args) -> Result<()> {
        if let Some(root) = &args.content_root {
            self.content_root = root.clone();
        }
        if let Some(state_file) = &args.state_file {
            self.state_file = std::path::absolute(state_file)
                .with_context(|| format!("cannot resolve {}", state_file.display()))?;
        }
        if let Some(concurrency) = args.concurrency {
            self.concurrency = concurrency;
        }
        if args.no_commit {
            self.commit = false;
        }
        self.content_root = std::path::absolute(&self.content_root)
            .with_context(|| format!("cannot resolve {}", self.content_root.display()))?;
        Ok(())
    }

    /// `path` as is when absolute, otherwise under the content root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.content_root.join(path)
        }
    }

    pub fn page_fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            redirect_limit: self.fetch.redirect_limit,
            max_bytes: self.fetch.max_page_bytes,
            ..FetchSettings::for_pages()
        }
    }

    pub fn image_fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_bytes: self.fetch.max_image_bytes,
            allowed_content_types: FetchSettings::for_images().allowed_content_types,
            ..self.page_fetch_settings()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
            jitter: self.retry.jitter,
        }
    }

    pub fn translator_settings(&self) -> TranslatorSettings {
        TranslatorSettings {
            endpoint: self.translator.endpoint.clone(),
            api_key: self.translator.api_key.clone(),
            source_lang: self.translator.source_lang.clone(),
            target_lang: self.translator.target_lang.clone(),
            max_chars_per_call: self.translator.max_chars_per_call,
            request_timeout: Duration::from_secs(self.translator.request_timeout_secs),
        }
    }

    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            assets_dir: self.resolve(&self.assets_dir),
            url_prefix: self.image_url_prefix.clone(),
            max_width: self.images.max_width,
            jpeg_quality: self.images.jpeg_quality,
            placeholder: self.images.placeholder.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(AppConfig::parse("()").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::parse(
            r#"(
                content_root: "/srv/blog",
                default_tags: ["wechat", "translated"],
                translator: (endpoint: "http://mt:5000/translate", api_key: Some("k")),
                retry: (max_attempts: 2),
            )"#,
        )
        .unwrap();

        assert_eq!(config.content_root, PathBuf::from("/srv/blog"));
        assert_eq!(config.default_tags, vec!["wechat", "translated"]);
        assert_eq!(config.translator.endpoint, "http://mt:5000/translate");
        assert_eq!(config.translator.api_key.as_deref(), Some("k"));
        assert_eq!(config.translator.target_lang, "en");
        assert_eq!(config.retry_policy().max_attempts, 2);
        assert_eq!(config.posts_dir, "posts");
        assert_eq!(
            config.image_settings().assets_dir,
            PathBuf::from("/srv/blog/public/images/posts")
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(AppConfig::parse("(post_dir: \"x\")").is_err());
    }

    #[test]
    fn command_line_overrides_the_file() {
        let mut config = AppConfig::default();
        let args = Args::parse_from([
            "republish",
            "--no-commit",
            "--concurrency",
            "5",
            "--content-root",
            "/srv/blog",
            "https://mp.weixin.qq.com/s/a",
        ]);
        config.apply_overrides(&args).unwrap();

        assert!(!config.commit);
        assert_eq!(config.concurrency, 5);
        assert_eq!(
            config.resolve(&config.state_file),
            PathBuf::from("/srv/blog/.republish/state.ron")
        );
    }

    #[test]
    fn relative_content_root_becomes_absolute() {
        let mut config = AppConfig::parse(r#"(content_root: "../blog")"#).unwrap();
        config
            .apply_overrides(&Args::parse_from(["republish", "u"]))
            .unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert!(config.content_root.is_absolute());
        assert_eq!(config.content_root, cwd.join("../blog"));
        assert!(config.image_settings().assets_dir.is_absolute());
    }

    #[test]
    fn image_fetches_accept_images_only() {
        let settings = AppConfig::default().image_fetch_settings();
        assert_eq!(settings.allowed_content_types, vec!["image/*".to_string()]);
        assert_eq!(settings.max_bytes, 20 * 1024 * 1024);
    }
}
