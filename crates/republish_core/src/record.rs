use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ArticleStatus;

/// Everything the pipeline remembers about one source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub source_url: String,
    /// Fingerprint of the content seen by the most recent extraction.
    #[serde(default)]
    pub content_fingerprint: Option<String>,
    pub status: ArticleStatus,
    pub last_processed_at: DateTime<Utc>,
    /// Content-store path of the published artifact, relative to the content root.
    #[serde(default)]
    pub artifact_path: Option<String>,
    /// Set only while `status` is `Failed`.
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Status the record was in when it failed.
    #[serde(default)]
    pub failed_stage: Option<ArticleStatus>,
    /// Rendered artifact waiting to be published.
    #[serde(default)]
    pub staged_artifact: Option<String>,
}

impl ArticleRecord {
    pub(crate) fn pending(source_url: &str, now: DateTime<Utc>) -> Self {
        Self {
            source_url: source_url.to_string(),
            content_fingerprint: None,
            status: ArticleStatus::Pending,
            last_processed_at: now,
            artifact_path: None,
            failure_reason: None,
            failed_stage: None,
            staged_artifact: None,
        }
    }
}

/// A forward step for [`crate::Ledger::advance`], carrying the data that step attaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Extracted { fingerprint: String },
    Translated { staged_artifact: Option<String> },
    Published { artifact_path: String },
}

impl Transition {
    pub fn target(&self) -> ArticleStatus {
        match self {
            Transition::Extracted { .. } => ArticleStatus::Extracted,
            Transition::Translated { .. } => ArticleStatus::Translated,
            Transition::Published { .. } => ArticleStatus::Published,
        }
    }
}
