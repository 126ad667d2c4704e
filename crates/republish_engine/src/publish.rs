use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to write artifact: {0}")]
    Write(#[from] PersistError),
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: io::Error,
    },
    #[error("{command} exited with {status}: {stderr}")]
    Commit {
        command: String,
        status: String,
        stderr: String,
    },
}

/// External commit step: paths under the content root plus a message.
#[async_trait::async_trait]
pub trait VersionControl: Send + Sync {
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<(), PublishError>;
}

/// Commits with the `git` binary, run inside the repository directory.
///
/// Clones share one lock, so concurrent commits into the same repository run
/// one after another instead of racing for `.git/index.lock`.
#[derive(Debug, Clone)]
pub struct GitCommitter {
    repo_dir: PathBuf,
    index_lock: Arc<Mutex<()>>,
}

impl GitCommitter {
    pub fn new(repo_dir: PathBuf) -> Self {
        Self {
            repo_dir,
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Pathspec for `path` as seen from inside the repository. Paths built
    /// from a relative content root would otherwise be resolved twice.
    fn pathspec(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.repo_dir) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
            _ => path.to_path_buf(),
        }
    }

    async fn git(&self, args: &[&str], paths: &[PathBuf]) -> Result<(), PublishError> {
        let command = format!("git {}", args.join(" "));
        let output = Command::new("git")
            .current_dir(&self.repo_dir)
            .args(args)
            .arg("--")
            .args(paths)
            .output()
            .await
            .map_err(|source| PublishError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            engine_debug!("{} ok", command);
            Ok(())
        } else {
            Err(PublishError::Commit {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl VersionControl for GitCommitter {
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<(), PublishError> {
        let paths: Vec<PathBuf> = paths.iter().map(|path| self.pathspec(path)).collect();
        let _guard = self.index_lock.lock().await;
        self.git(&["add"], &paths).await?;
        self.git(&["commit", "-m", message], &paths).await
    }
}

/// Leaves written files uncommitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCommit;

#[async_trait::async_trait]
impl VersionControl for NoCommit {
    async fn commit(&self, paths: &[PathBuf], _message: &str) -> Result<(), PublishError> {
        engine_debug!("commit disabled, {} paths left uncommitted", paths.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Artifact written and committed.
    Written,
    /// Identical artifact already on disk; nothing written or committed.
    Unchanged,
}

pub struct PublishRequest<'a> {
    /// Relative to the content root.
    pub artifact_path: &'a str,
    pub content: &'a str,
    /// Image files referenced by the artifact.
    pub assets: &'a [PathBuf],
    pub title: &'a str,
}

/// Writes artifacts into the content store and commits them.
#[derive(Clone)]
pub struct Publisher {
    content_root: PathBuf,
    vcs: Arc<dyn VersionControl>,
}

impl Publisher {
    pub fn new(content_root: PathBuf, vcs: Arc<dyn VersionControl>) -> Self {
        Self { content_root, vcs }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// On a failed commit the artifact file is restored to its previous
    /// content, so a retry sees the change again.
    pub async fn publish(&self, request: PublishRequest<'_>) -> Result<PublishOutcome, PublishError> {
        let target = self.content_root.join(request.artifact_path);
        let previous = read_existing(&target)?;
        if previous.as_deref() == Some(request.content) {
            engine_info!("{} unchanged, nothing to publish", request.artifact_path);
            return Ok(PublishOutcome::Unchanged);
        }

        let writer = AtomicFileWriter::new(self.content_root.clone());
        writer.write(request.artifact_path, request.content)?;

        let verb = if previous.is_some() { "Update" } else { "Add" };
        let message = format!("{verb} post: {}", request.title);
        let mut paths = vec![target.clone()];
        paths.extend(request.assets.iter().cloned());

        if let Err(err) = self.vcs.commit(&paths, &message).await {
            engine_warn!("commit of {} failed, reverting file: {}", request.artifact_path, err);
            match previous {
                Some(old) => {
                    writer.write(request.artifact_path, &old)?;
                }
                None => {
                    fs::remove_file(&target).map_err(PersistError::Io)?;
                }
            }
            return Err(err);
        }
        engine_info!("published {}", request.artifact_path);
        Ok(PublishOutcome::Written)
    }
}

fn read_existing(path: &Path) -> Result<Option<String>, PersistError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PersistError::Io(err)),
    }
}
