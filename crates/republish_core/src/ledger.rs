use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{ArticleRecord, ArticleStatus, Transition};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("no record for {0}")]
    UnknownArticle(String),
    #[error("invalid transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: ArticleStatus,
        to: ArticleStatus,
    },
}

/// Why an incoming URL is, or is not, processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Never seen before.
    New,
    /// Fingerprint differs from the one stored.
    Changed,
    /// The previous run ended in `Failed`.
    RetryFailed,
    /// The previous run stopped in a non-terminal status without failing.
    Interrupted,
    /// Published with the same fingerprint; nothing to do.
    Unchanged,
}

impl Decision {
    pub fn should_process(self) -> bool {
        self != Decision::Unchanged
    }
}

/// One record per source URL, keyed and iterated in URL order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: BTreeMap<String, ArticleRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from stored records. A later record for the same URL
    /// replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = ArticleRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.source_url.clone(), record))
            .collect();
        Self { records }
    }

    pub fn get(&self, url: &str) -> Option<&ArticleRecord> {
        self.records.get(url)
    }

    pub fn records(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn decide(&self, url: &str, fresh_fingerprint: &str) -> Decision {
        let Some(record) = self.records.get(url) else {
            return Decision::New;
        };
        if record.status == ArticleStatus::Failed {
            return Decision::RetryFailed;
        }
        if record.content_fingerprint.as_deref() != Some(fresh_fingerprint) {
            return Decision::Changed;
        }
        if record.status.is_terminal() {
            Decision::Unchanged
        } else {
            Decision::Interrupted
        }
    }

    pub fn should_process(&self, url: &str, fresh_fingerprint: &str) -> bool {
        self.decide(url, fresh_fingerprint).should_process()
    }

    /// Staged artifact that can be published without re-translating.
    ///
    /// Only offered when the content is unchanged and the record stopped at
    /// `Translated`, either by failing there or by being interrupted.
    pub fn resumable_artifact(&self, url: &str, fresh_fingerprint: &str) -> Option<&str> {
        let record = self.records.get(url)?;
        if record.content_fingerprint.as_deref() != Some(fresh_fingerprint) {
            return None;
        }
        let stopped_at_translated = match record.status {
            ArticleStatus::Translated => true,
            ArticleStatus::Failed => record.failed_stage == Some(ArticleStatus::Translated),
            _ => false,
        };
        if stopped_at_translated {
            record.staged_artifact.as_deref()
        } else {
            None
        }
    }

    /// Source URL whose published artifact lives at `path`, if any.
    pub fn artifact_owner(&self, path: &str) -> Option<&str> {
        self.records
            .values()
            .find(|record| record.artifact_path.as_deref() == Some(path))
            .map(|record| record.source_url.as_str())
    }

    /// Creates the record or resets it to `Pending`.
    ///
    /// The fingerprint, artifact path and staged artifact of earlier runs are
    /// kept; failure details are cleared.
    pub fn begin_processing(&mut self, url: &str, now: DateTime<Utc>) -> &ArticleRecord {
        let record = self
            .records
            .entry(url.to_string())
            .and_modify(|record| {
                record.status = ArticleStatus::Pending;
                record.last_processed_at = now;
                record.failure_reason = None;
                record.failed_stage = None;
            })
            .or_insert_with(|| ArticleRecord::pending(url, now));
        &*record
    }

    /// Moves a record exactly one step forward.
    pub fn advance(
        &mut self,
        url: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<&ArticleRecord, LedgerError> {
        let record = self
            .records
            .get_mut(url)
            .ok_or_else(|| LedgerError::UnknownArticle(url.to_string()))?;
        let to = transition.target();
        if record.status.next() != Some(to) {
            return Err(LedgerError::InvalidTransition {
                url: url.to_string(),
                from: record.status,
                to,
            });
        }

        match transition {
            Transition::Extracted { fingerprint } => {
                record.content_fingerprint = Some(fingerprint);
            }
            Transition::Translated { staged_artifact } => {
                record.staged_artifact = staged_artifact;
            }
            Transition::Published { artifact_path } => {
                record.artifact_path = Some(artifact_path);
                record.staged_artifact = None;
            }
        }
        record.status = to;
        record.last_processed_at = now;
        Ok(&*record)
    }

    /// Records a failure. Published records are never demoted, and prior
    /// artifact paths are left in place.
    pub fn mark_failed(
        &mut self,
        url: &str,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<&ArticleRecord, LedgerError> {
        let record = self
            .records
            .get_mut(url)
            .ok_or_else(|| LedgerError::UnknownArticle(url.to_string()))?;
        if record.status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                url: url.to_string(),
                from: record.status,
                to: ArticleStatus::Failed,
            });
        }
        if record.status != ArticleStatus::Failed {
            record.failed_stage = Some(record.status);
        }
        record.status = ArticleStatus::Failed;
        record.failure_reason = Some(reason.into());
        record.last_processed_at = now;
        Ok(&*record)
    }
}
