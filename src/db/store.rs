//! On-disk layout of per-project indices and their advisory locks.
//!
//! ```text
//! {root}/{project}/index.db          live index
//! {root}/.{project}.staging/index.db rebuild in progress
//! {root}/.{project}.old/             previous index during commit
//! {root}/.locks/{project}.lock       fs2 lock file
//! ```
//!
//! Builds hold an exclusive lock for the whole rebuild; retrievals hold a
//! shared lock while they read. Neither waits: contention is reported as
//! [`IndexError::Locked`] so the caller decides whether to retry.
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, warn};

use super::{INDEX_FILE, IndexError, VectorIndex};
use crate::config::validate_project_name;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError + '_ {
    move |source| IndexError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Root directory holding one namespaced index per project.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

/// Held advisory lock on a project's index. Released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    _file: File,
    project: String,
    exclusive: bool,
}

impl ProjectLock {
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl IndexStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    #[must_use]
    pub fn index_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(INDEX_FILE)
    }

    fn staging_dir(&self, project: &str) -> PathBuf {
        self.root.join(format!(".{project}.staging"))
    }

    fn backup_dir(&self, project: &str) -> PathBuf {
        self.root.join(format!(".{project}.old"))
    }

    fn lock_path(&self, project: &str) -> PathBuf {
        self.root.join(".locks").join(format!("{project}.lock"))
    }

    /// Whether a built index exists for `project`.
    #[must_use]
    pub fn exists(&self, project: &str) -> bool {
        self.index_path(project).is_file()
    }

    fn open_lock_file(&self, project: &str) -> Result<File, IndexError> {
        validate_project_name(project)?;
        let path = self.lock_path(project);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err(&path))
    }

    /// Take the rebuild lock without waiting.
    pub fn lock_exclusive(&self, project: &str) -> Result<ProjectLock, IndexError> {
        let file = self.open_lock_file(project)?;
        FileExt::try_lock_exclusive(&file).map_err(|_| IndexError::Locked {
            project: project.to_string(),
            reason: "index in use",
        })?;
        debug!("Acquired exclusive lock for '{project}'");
        Ok(ProjectLock {
            _file: file,
            project: project.to_string(),
            exclusive: true,
        })
    }

    /// Take a read lock without waiting.
    pub fn lock_shared(&self, project: &str) -> Result<ProjectLock, IndexError> {
        let file = self.open_lock_file(project)?;
        FileExt::try_lock_shared(&file).map_err(|_| IndexError::Locked {
            project: project.to_string(),
            reason: "rebuild in progress",
        })?;
        Ok(ProjectLock {
            _file: file,
            project: project.to_string(),
            exclusive: false,
        })
    }

    /// Open a project's live index read-only. The caller holds a lock.
    pub fn open(&self, project: &str, _lock: &ProjectLock) -> Result<VectorIndex, IndexError> {
        VectorIndex::open(self.index_path(project), project)
    }

    /// Start a rebuild into a fresh staging directory.
    ///
    /// Nothing visible to readers changes until [`StagedIndex::commit`].
    pub fn begin_rebuild<'a>(
        &self,
        lock: &'a ProjectLock,
        dimensions: usize,
        model_id: &str,
    ) -> Result<StagedIndex<'a>, IndexError> {
        let project = lock.project();
        let staging = self.staging_dir(project);
        if staging.exists() {
            warn!("Removing stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging).map_err(io_err(&staging))?;
        }
        fs::create_dir_all(&staging).map_err(io_err(&staging))?;

        let index = VectorIndex::create(staging.join(INDEX_FILE), project, dimensions, model_id)?;
        Ok(StagedIndex {
            index: Some(index),
            staging_dir: staging,
            target_dir: self.project_dir(project),
            backup_dir: self.backup_dir(project),
            _lock: lock,
        })
    }
}

/// An index being rebuilt. Dropping it without committing discards it.
pub struct StagedIndex<'a> {
    index: Option<VectorIndex>,
    staging_dir: PathBuf,
    target_dir: PathBuf,
    backup_dir: PathBuf,
    _lock: &'a ProjectLock,
}

impl StagedIndex<'_> {
    pub fn index_mut(&mut self) -> &mut VectorIndex {
        self.index
            .as_mut()
            .unwrap_or_else(|| unreachable!("staged index taken before commit"))
    }

    /// Replace the live index with the staged one.
    ///
    /// The previous index is moved aside, the staging directory moved into
    /// place, and only then is the previous index deleted. If the second
    /// move fails the previous index is put back.
    pub fn commit(mut self) -> Result<(), IndexError> {
        // Close the connection before moving its file.
        drop(self.index.take());
        swap_into_place(&self.staging_dir, &self.target_dir, &self.backup_dir)?;
        info!("Index committed to {}", self.target_dir.display());
        Ok(())
    }
}

fn swap_into_place(staging: &Path, target: &Path, backup: &Path) -> Result<(), IndexError> {
    if backup.exists() {
        warn!("Removing stale backup directory {}", backup.display());
        fs::remove_dir_all(backup).map_err(io_err(backup))?;
    }
    let had_live = target.exists();
    if had_live {
        fs::rename(target, backup).map_err(io_err(target))?;
    }

    if let Err(source) = fs::rename(staging, target) {
        if had_live {
            if let Err(e) = fs::rename(backup, target) {
                warn!("Could not restore {} from {}: {e}", target.display(), backup.display());
            }
        }
        return Err(io_err(target)(source));
    }

    if had_live {
        if let Err(e) = fs::remove_dir_all(backup) {
            debug!("Could not remove {}: {e}", backup.display());
        }
    }
    Ok(())
}

impl Drop for StagedIndex<'_> {
    fn drop(&mut self) {
        if self.index.is_some() || self.staging_dir.exists() {
            drop(self.index.take());
            if let Err(e) = fs::remove_dir_all(&self.staging_dir) {
                debug!("Could not remove {}: {e}", self.staging_dir.display());
            }
        }
    }
}
