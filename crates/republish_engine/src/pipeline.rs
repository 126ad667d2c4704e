//! Run loop: sequences the stages for each article and gates them on the
//! state ledger.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use futures_util::stream::{self, StreamExt};
use republish_core::Transition;
use serde::{Deserialize, Serialize};

use crate::decode::decode_html;
use crate::extract::{ExtractedArticle, Extractor, WeChatExtractor};
use crate::fetch::Fetcher;
use crate::filename;
use crate::fingerprint::short_hash;
use crate::glossary::Glossary;
use crate::images::{ImageProcessor, ImageSettings, ImageWarning};
use crate::markdown::{render_artifact, ArtifactMeta};
use crate::persist::{AtomicFileWriter, PersistError};
use crate::publish::{PublishOutcome, PublishRequest, Publisher, VersionControl};
use crate::retry::{with_retry, RetryPolicy};
use crate::state::{StateError, StateManager};
use crate::translate::{TranslationService, Translator};
use crate::Stage;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root of the content store; artifact paths are relative to it.
    pub content_root: PathBuf,
    pub posts_dir: String,
    pub staging_dir: PathBuf,
    pub concurrency: usize,
    pub tags: Vec<String>,
    pub retry: RetryPolicy,
    pub images: ImageSettings,
    pub glossary: Glossary,
}

/// External collaborators. Tests swap these for fakes.
#[derive(Clone)]
pub struct Services {
    pub page_fetcher: Arc<dyn Fetcher>,
    pub image_fetcher: Arc<dyn Fetcher>,
    pub translation: Arc<dyn TranslationService>,
    pub vcs: Arc<dyn VersionControl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    /// Published before with the same content.
    Skipped,
    Processed {
        artifact_path: String,
        publish: PublishOutcome,
        /// Published from a staged artifact without translating again.
        resumed: bool,
        image_warnings: Vec<ImageWarning>,
    },
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleReport {
    pub url: String,
    pub outcome: ArticleOutcome,
}

#[derive(Debug)]
pub struct BatchReport {
    /// In input order.
    pub articles: Vec<ArticleReport>,
    /// Set when the state file could not be updated; the run stopped there.
    pub fatal: Option<StateError>,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.articles
            .iter()
            .filter(|report| matches!(report.outcome, ArticleOutcome::Failed { .. }))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.fatal.is_none() && self.failed_count() == 0
    }
}

/// Rendered artifact kept between the translate and publish steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StagedArtifact {
    artifact_path: String,
    title: String,
    content: String,
    assets: Vec<PathBuf>,
}

enum ArticleFailure {
    At { stage: Stage, reason: String },
    State(StateError),
}

impl From<StateError> for ArticleFailure {
    fn from(err: StateError) -> Self {
        ArticleFailure::State(err)
    }
}

fn at<E: fmt::Display>(stage: Stage) -> impl FnOnce(E) -> ArticleFailure {
    move |err| ArticleFailure::At {
        stage,
        reason: err.to_string(),
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    state: StateManager,
    services: Services,
    extractor: Box<dyn Extractor>,
    translator: Translator,
    images: ImageProcessor,
    publisher: Publisher,
    /// Artifact paths claimed during this run, to keep concurrent articles apart.
    reserved_paths: Mutex<BTreeMap<String, String>>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, state: StateManager, services: Services) -> Self {
        let translator = Translator::new(settings.glossary.clone(), settings.retry.clone());
        let images = ImageProcessor::new(settings.images.clone(), settings.retry.clone());
        let publisher = Publisher::new(settings.content_root.clone(), services.vcs.clone());
        Self {
            settings,
            state,
            services,
            extractor: Box::new(WeChatExtractor),
            translator,
            images,
            publisher,
            reserved_paths: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Processes each distinct URL once, up to `concurrency` at a time.
    pub async fn run_batch(&self, urls: &[String]) -> BatchReport {
        let urls = dedup_urls(urls);
        engine_info!(
            "processing {} articles, concurrency {}",
            urls.len(),
            self.settings.concurrency.max(1)
        );

        let mut articles = Vec::with_capacity(urls.len());
        let mut results = std::pin::pin!(stream::iter(urls)
            .map(|url| async move {
                let result = self.process_article(&url).await;
                (url, result)
            })
            .buffered(self.settings.concurrency.max(1)));

        while let Some((url, result)) = results.next().await {
            match result {
                Ok(outcome) => articles.push(ArticleReport { url, outcome }),
                Err(err) => {
                    engine_error!("state update failed while processing {}: {}", url, err);
                    return BatchReport {
                        articles,
                        fatal: Some(err),
                    };
                }
            }
        }
        BatchReport {
            articles,
            fatal: None,
        }
    }

    /// Per-article failures are recorded and returned as an outcome; only a
    /// state error escapes.
    pub async fn process_article(&self, url: &str) -> Result<ArticleOutcome, StateError> {
        match self.run_article(url).await {
            Ok(outcome) => Ok(outcome),
            Err(ArticleFailure::State(err)) => Err(err),
            Err(ArticleFailure::At { stage, reason }) => {
                engine_error!("{} failed while {}: {}", url, stage, reason);
                if matches!(stage, Stage::Fetching | Stage::Extracting) {
                    self.state.fail_unclaimed(url, &reason)?;
                } else {
                    self.state.mark_failed(url, &reason)?;
                }
                Ok(ArticleOutcome::Failed { stage, reason })
            }
        }
    }

    async fn run_article(&self, url: &str) -> Result<ArticleOutcome, ArticleFailure> {
        let label = format!("fetch {url}");
        let page = with_retry(&self.settings.retry, &label, || {
            self.services.page_fetcher.fetch(url)
        })
        .await
        .map_err(at(Stage::Fetching))?;
        let decoded = decode_html(&page.bytes, page.metadata.content_type.as_deref())
            .map_err(at(Stage::Extracting))?;
        let article = self
            .extractor
            .extract(&decoded.html, url)
            .map_err(at(Stage::Extracting))?;

        let decision = self.state.decide(url, &article.fingerprint);
        if !decision.should_process() {
            engine_info!("{} unchanged, skipping", url);
            return Ok(ArticleOutcome::Skipped);
        }
        engine_info!("{} processing ({:?})", url, decision);

        let resume = self
            .state
            .resumable_artifact(url, &article.fingerprint)
            .map(PathBuf::from)
            .and_then(|path| read_staged(&path).map(|staged| (path, staged)));

        self.state.begin_processing(url)?;
        self.state.advance(
            url,
            Transition::Extracted {
                fingerprint: article.fingerprint.clone(),
            },
        )?;

        let resumed = resume.is_some();
        let (staged_path, staged, image_warnings) = match resume {
            Some((path, staged)) => {
                engine_info!("{} resuming from staged artifact {:?}", url, path);
                (path, staged, Vec::new())
            }
            None => self.translate_and_stage(url, &article).await?,
        };
        self.state.advance(
            url,
            Transition::Translated {
                staged_artifact: Some(staged_path.display().to_string()),
            },
        )?;

        let publish = self
            .publisher
            .publish(PublishRequest {
                artifact_path: &staged.artifact_path,
                content: &staged.content,
                assets: &staged.assets,
                title: &staged.title,
            })
            .await
            .map_err(at(Stage::Publishing))?;
        self.state.advance(
            url,
            Transition::Published {
                artifact_path: staged.artifact_path.clone(),
            },
        )?;
        if let Err(err) = fs::remove_file(&staged_path) {
            engine_warn!("could not remove staged artifact {:?}: {}", staged_path, err);
        }

        Ok(ArticleOutcome::Processed {
            artifact_path: staged.artifact_path,
            publish,
            resumed,
            image_warnings,
        })
    }

    async fn translate_and_stage(
        &self,
        url: &str,
        article: &ExtractedArticle,
    ) -> Result<(PathBuf, StagedArtifact, Vec<ImageWarning>), ArticleFailure> {
        let images = self
            .images
            .process(self.services.image_fetcher.as_ref(), &article.image_urls())
            .await;
        let translated = self
            .translator
            .translate_article(self.services.translation.as_ref(), article)
            .await
            .map_err(at(Stage::Translating))?;

        let meta = ArtifactMeta {
            tags: self.settings.tags.clone(),
        };
        let staged = StagedArtifact {
            artifact_path: self.choose_artifact_path(url, &translated.title, translated.date),
            title: translated.title.clone(),
            content: render_artifact(&translated, &images, &meta),
            assets: images
                .assets()
                .iter()
                .map(|asset| asset.file_path.clone())
                .collect(),
        };
        let path = self
            .write_staged(url, &staged)
            .map_err(at(Stage::Rendering))?;
        engine_debug!("{} staged at {:?}", url, path);
        Ok((path, staged, images.warnings().to_vec()))
    }

    /// A published article keeps its path. A new one gets the date and slug
    /// path, with a URL hash appended if someone else already has it.
    fn choose_artifact_path(&self, url: &str, title: &str, date: chrono::NaiveDate) -> String {
        if let Some(existing) = self.state.record(url).and_then(|record| record.artifact_path) {
            return existing;
        }
        let candidate = filename::artifact_path(&self.settings.posts_dir, date, title, url);
        let mut reserved = self
            .reserved_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let taken = match self.state.artifact_owner(&candidate) {
            Some(owner) => owner != url,
            None => {
                reserved.get(&candidate).is_some_and(|owner| owner != url)
                    || self.settings.content_root.join(&candidate).exists()
            }
        };
        let path = if taken {
            let alternative = filename::disambiguated_path(&candidate, url);
            engine_info!("{} is taken, using {}", candidate, alternative);
            alternative
        } else {
            candidate
        };
        reserved.insert(path.clone(), url.to_string());
        path
    }

    fn write_staged(&self, url: &str, staged: &StagedArtifact) -> Result<PathBuf, PersistError> {
        let content = ron::ser::to_string_pretty(staged, ron::ser::PrettyConfig::new())
            .map_err(|err| PersistError::Io(io::Error::other(err.to_string())))?;
        let name = format!("{}.ron", short_hash(url.as_bytes(), 16));
        AtomicFileWriter::new(self.settings.staging_dir.clone()).write(&name, &content)
    }
}

fn read_staged(path: &Path) -> Option<StagedArtifact> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            engine_warn!("staged artifact {:?} unavailable: {}", path, err);
            return None;
        }
    };
    match ron::from_str(&content) {
        Ok(staged) => Some(staged),
        Err(err) => {
            engine_warn!("staged artifact {:?} unreadable: {}", path, err);
            None
        }
    }
}

/// Trimmed, non-empty URLs in first-seen order.
pub fn dedup_urls<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|url| url.as_ref().trim())
        .filter(|url| !url.is_empty() && seen.insert(url.to_string()))
        .map(str::to_string)
        .collect()
}
