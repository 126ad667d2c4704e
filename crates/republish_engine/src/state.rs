//! On-disk article ledger with an exclusive writer lock.
//!
//! Every mutation is written back before the call returns. The lock file sits
//! next to the state file and lives as long as the [`StateManager`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use republish_core::{ArticleRecord, Decision, Ledger, LedgerError, Transition};
use serde::{Deserialize, Serialize};

use crate::persist::{AtomicFileWriter, PersistError};

pub const STATE_SCHEMA_VERSION: u32 = 1;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("state file {path} could not be read: {source}")]
    Unreadable { path: String, source: io::Error },
    #[error("state file {path} is locked by another run (remove {lock} if no run is active)")]
    Locked { path: String, lock: String },
    #[error("state file {path} has schema version {found}, newest supported is {supported}")]
    UnsupportedSchema {
        path: String,
        found: u32,
        supported: u32,
    },
    #[error("failed to write state: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to serialise state: {0}")]
    Serialize(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    schema_version: u32,
    articles: Vec<ArticleRecord>,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

/// Removes the lock file when dropped.
#[derive(Debug)]
struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    fn acquire(state_path: &Path) -> Result<Self, StateError> {
        let path = lock_path(state_path);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StateError::Locked {
                    path: state_path.display().to_string(),
                    lock: path.display().to_string(),
                });
            }
            Err(err) => return Err(PersistError::Io(err).into()),
        };
        if let Err(err) = writeln!(file, "{}", std::process::id()) {
            engine_warn!("could not record pid in lock {:?}: {}", path, err);
        }
        Ok(Self { path })
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            engine_warn!("failed to remove lock {:?}: {}", self.path, err);
        }
    }
}

fn lock_path(state_path: &Path) -> PathBuf {
    let mut name = state_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    state_path.with_file_name(name)
}

/// Sole owner of article records for the duration of a run.
pub struct StateManager {
    path: PathBuf,
    ledger: Mutex<Ledger>,
    clock: Clock,
    _lock: WriterLock,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StateManager {
    /// Takes the writer lock and loads the state file. A missing file is an
    /// empty ledger; anything unreadable is an error and the lock is released.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        Self::open_with_clock(path, system_clock())
    }

    pub fn open_with_clock(path: &Path, clock: Clock) -> Result<Self, StateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::persist::ensure_output_dir(parent)?;
        }
        let lock = WriterLock::acquire(path)?;
        let ledger = load(path)?;
        engine_info!("loaded {} article records from {:?}", ledger.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            ledger: Mutex::new(ledger),
            clock,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn decide(&self, url: &str, fresh_fingerprint: &str) -> Decision {
        self.ledger().decide(url, fresh_fingerprint)
    }

    pub fn should_process(&self, url: &str, fresh_fingerprint: &str) -> bool {
        self.ledger().should_process(url, fresh_fingerprint)
    }

    pub fn record(&self, url: &str) -> Option<ArticleRecord> {
        self.ledger().get(url).cloned()
    }

    pub fn records(&self) -> Vec<ArticleRecord> {
        self.ledger().records().cloned().collect()
    }

    pub fn resumable_artifact(&self, url: &str, fresh_fingerprint: &str) -> Option<String> {
        self.ledger()
            .resumable_artifact(url, fresh_fingerprint)
            .map(str::to_string)
    }

    pub fn artifact_owner(&self, path: &str) -> Option<String> {
        self.ledger().artifact_owner(path).map(str::to_string)
    }

    pub fn begin_processing(&self, url: &str) -> Result<ArticleRecord, StateError> {
        self.mutate(|ledger, now| Ok(ledger.begin_processing(url, now).clone()))
    }

    pub fn advance(&self, url: &str, transition: Transition) -> Result<ArticleRecord, StateError> {
        self.mutate(|ledger, now| Ok(ledger.advance(url, transition, now)?.clone()))
    }

    pub fn mark_failed(&self, url: &str, reason: &str) -> Result<ArticleRecord, StateError> {
        self.mutate(|ledger, now| Ok(ledger.mark_failed(url, reason, now)?.clone()))
    }

    /// Failure before the article was claimed for processing (fetch or
    /// extraction). A published record keeps its status; anything else ends
    /// up `Failed`.
    pub fn fail_unclaimed(&self, url: &str, reason: &str) -> Result<Option<ArticleRecord>, StateError> {
        self.mutate(|ledger, now| {
            match ledger.get(url).map(|record| record.status) {
                Some(status) if status.is_terminal() => return Ok(None),
                Some(_) => {}
                None => {
                    ledger.begin_processing(url, now);
                }
            }
            Ok(Some(ledger.mark_failed(url, reason, now)?.clone()))
        })
    }

    /// Applies `change` and writes the result back while holding the ledger
    /// lock. Nothing is written when `change` fails.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Ledger, DateTime<Utc>) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut ledger = self.ledger();
        let now = (self.clock)();
        let mut updated = ledger.clone();
        let value = change(&mut updated, now)?;
        self.write(&updated)?;
        *ledger = updated;
        Ok(value)
    }

    fn write(&self, ledger: &Ledger) -> Result<(), StateError> {
        let file = StateFile {
            schema_version: STATE_SCHEMA_VERSION,
            articles: ledger.records().cloned().collect(),
        };
        let content = ron::ser::to_string_pretty(&file, ron::ser::PrettyConfig::new())
            .map_err(|err| StateError::Serialize(err.to_string()))?;
        let (dir, name) = split_path(&self.path);
        AtomicFileWriter::new(dir).write(&name, &content)?;
        engine_debug!("state written to {:?}", self.path);
        Ok(())
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn split_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, name)
}

fn load(path: &Path) -> Result<Ledger, StateError> {
    let display = path.display().to_string();
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            engine_info!("no state file at {:?}, starting empty", path);
            return Ok(Ledger::new());
        }
        Err(source) => {
            return Err(StateError::Unreadable {
                path: display,
                source,
            })
        }
    };
    parse_state(&display, &content)
}

/// Schema 0 is the unversioned layout: a bare list of records.
fn parse_state(path: &str, content: &str) -> Result<Ledger, StateError> {
    let corrupt = |message: String| StateError::Corrupt {
        path: path.to_string(),
        message,
    };

    let version = match ron::from_str::<VersionProbe>(content) {
        Ok(probe) => probe.schema_version,
        Err(probe_err) => {
            let records: Vec<ArticleRecord> =
                ron::from_str(content).map_err(|_| corrupt(probe_err.to_string()))?;
            engine_info!("migrating unversioned state file {}", path);
            return Ok(Ledger::from_records(records));
        }
    };
    if version > STATE_SCHEMA_VERSION {
        return Err(StateError::UnsupportedSchema {
            path: path.to_string(),
            found: version,
            supported: STATE_SCHEMA_VERSION,
        });
    }

    let file: StateFile = ron::from_str(content).map_err(|err| corrupt(err.to_string()))?;
    let mut seen = std::collections::BTreeSet::new();
    if let Some(duplicate) = file
        .articles
        .iter()
        .find(|record| !seen.insert(record.source_url.as_str()))
    {
        return Err(corrupt(format!(
            "duplicate record for {}",
            duplicate.source_url
        )));
    }
    Ok(Ledger::from_records(file.articles))
}
