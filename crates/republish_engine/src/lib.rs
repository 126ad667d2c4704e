//! Republish engine: every stage that touches the network, the filesystem or
//! git, plus the run loop that drives them.
mod decode;
mod extract;
mod fetch;
mod filename;
mod fingerprint;
mod glossary;
mod images;
mod markdown;
mod persist;
mod pipeline;
mod publish;
mod retry;
mod state;
mod translate;
mod types;

pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use extract::{ArticleBlock, ExtractedArticle, ExtractionError, Extractor, WeChatExtractor};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::{artifact_path, disambiguated_path, slugify};
pub use fingerprint::{content_fingerprint, normalize_html, short_hash};
pub use glossary::{Glossary, GlossaryEntry, GlossaryError, ProtectedText};
pub use images::{ImageAsset, ImageError, ImageMap, ImageProcessor, ImageSettings, ImageWarning};
pub use markdown::{excerpt, render_artifact, ArtifactMeta, MAX_EXCERPT_CHARS};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{
    dedup_urls, ArticleOutcome, ArticleReport, BatchReport, Pipeline, PipelineSettings, Services,
};
pub use publish::{
    GitCommitter, NoCommit, PublishError, PublishOutcome, PublishRequest, Publisher,
    VersionControl,
};
pub use retry::{with_retry, IsRetryable, RetryPolicy};
pub use state::{system_clock, Clock, StateError, StateManager, STATE_SCHEMA_VERSION};
pub use translate::{
    plan_chunks, Chunk, LibreTranslateService, Piece, ServiceError, TranslatedArticle,
    TranslationError, TranslationService, Translator, TranslatorSettings,
};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput, Stage};
