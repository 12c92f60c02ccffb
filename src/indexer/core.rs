use crate::chunker::{self, Chunk};
use crate::config::{Config, ConfigError, validate_chunking, validate_project_name};
use crate::db::{IndexError, IndexStore};
use crate::embedder::{Embedder, EmbedderError, check_dimensions};
use crate::loader::{self, DocumentRecord};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// A new index replaced whatever was there before.
    Built,
    /// Nothing loadable; the existing index (if any) was left alone.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub project: String,
    pub status: BuildStatus,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub failed: usize,
    pub loaded_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
}

impl BuildReport {
    fn new(project: &str, status: BuildStatus, documents: usize) -> Self {
        Self {
            project: project.to_string(),
            status,
            documents,
            chunks: 0,
            embedded: 0,
            failed: 0,
            loaded_files: 0,
            skipped_files: 0,
            failed_files: 0,
        }
    }

    /// True when every file loaded and every chunk embedded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.failed_files == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub workers: usize,
    pub batch_size: usize,
}

impl From<&Config> for BuildOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            workers: config.build.workers,
            batch_size: config.build.batch_size,
        }
    }
}

/// Loader → Chunker → Embedder → Index population, one project at a time.
pub struct IndexBuilder<'a, E: Embedder + ?Sized> {
    store: &'a IndexStore,
    embedder: &'a E,
    options: BuildOptions,
}

impl<'a, E: Embedder + ?Sized> IndexBuilder<'a, E> {
    /// Chunking options are validated here, before any I/O happens.
    pub fn new(
        store: &'a IndexStore,
        embedder: &'a E,
        options: BuildOptions,
    ) -> Result<Self, ConfigError> {
        validate_chunking(options.chunk_size, options.chunk_overlap)?;
        if options.workers == 0 {
            return Err(ConfigError::NotPositive("build.workers"));
        }
        if options.batch_size == 0 {
            return Err(ConfigError::NotPositive("build.batch_size"));
        }
        Ok(Self {
            store,
            embedder,
            options,
        })
    }

    /// Rebuild `project`'s index from `documents`.
    ///
    /// Holds the project's exclusive lock for the whole rebuild. An empty
    /// chunk set is a no-op. Per-chunk embedding failures are counted; the
    /// build only fails if no chunk embeds at all, in which case the
    /// previous index survives untouched.
    pub fn build(
        &self,
        project: &str,
        documents: &[DocumentRecord],
    ) -> Result<BuildReport, IndexError> {
        validate_project_name(project)?;
        let chunks = chunker::split(
            documents,
            self.options.chunk_size,
            self.options.chunk_overlap,
        )?;

        let mut report = BuildReport::new(project, BuildStatus::Empty, documents.len());
        if chunks.is_empty() {
            warn!("No loadable content for project '{project}', index not rebuilt");
            return Ok(report);
        }
        report.chunks = chunks.len();

        let lock = self.store.lock_exclusive(project)?;
        let mut staged =
            self.store
                .begin_rebuild(&lock, self.embedder.dimensions(), self.embedder.model_id())?;

        info!(
            "Embedding {} chunks from {} documents for '{project}'",
            chunks.len(),
            documents.len()
        );
        let vectors = self.embed_all(&chunks);

        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            match vector {
                Ok(v) => entries.push((v, chunk)),
                Err(e) => {
                    warn!(
                        "Failed to embed chunk at {}:{} - {e}",
                        chunk.source_path, chunk.offset
                    );
                    report.failed += 1;
                }
            }
        }

        if entries.is_empty() {
            return Err(IndexError::AllEmbeddingsFailed(report.failed));
        }

        report.embedded = staged.index_mut().add_batch(&entries)?;
        staged.commit()?;
        report.status = BuildStatus::Built;

        info!(
            "Built index for '{project}': {} embedded, {} failed",
            report.embedded, report.failed
        );
        Ok(report)
    }

    /// Load every file under `dir` and rebuild `project` from it.
    pub fn build_project_dir<P: AsRef<Path>>(
        &self,
        project: &str,
        dir: P,
    ) -> Result<BuildReport, IndexError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(IndexError::Io {
                path: dir.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "project directory does not exist",
                ),
            });
        }
        let summary = loader::load_project_dir(dir, project);
        let mut report = self.build(project, &summary.documents)?;
        report.loaded_files = summary.loaded_files;
        report.skipped_files = summary.skipped_files.len();
        report.failed_files = summary.failed_files.len();
        Ok(report)
    }

    /// Build one index per immediate subdirectory of `input_root`.
    ///
    /// Projects are independent: one failing does not stop the others.
    pub fn build_all<P: AsRef<Path>>(
        &self,
        input_root: P,
    ) -> Result<Vec<(String, Result<BuildReport, IndexError>)>, IndexError> {
        let input_root = input_root.as_ref();
        let mut outcomes = Vec::new();
        for (project, dir) in project_dirs(input_root)? {
            info!("Building project '{project}' from {}", dir.display());
            let outcome = self.build_project_dir(&project, &dir);
            if let Err(e) = &outcome {
                warn!("Project '{project}' failed: {e}");
            }
            outcomes.push((project, outcome));
        }
        Ok(outcomes)
    }

    /// Embed all chunks on a worker pool; output order matches `chunks`.
    fn embed_all(&self, chunks: &[Chunk]) -> Vec<Result<Vec<f32>, EmbedderError>> {
        let progress = progress_bar(chunks.len() as u64, "embedding");
        let work = || -> Vec<Result<Vec<f32>, EmbedderError>> {
            chunks
                .par_chunks(self.options.batch_size)
                .map(|batch| {
                    let out = self.embed_batch(batch);
                    progress.inc(batch.len() as u64);
                    out
                })
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        };

        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                warn!("Could not start embedding pool ({e}), using global pool");
                work()
            }
        };
        progress.finish_and_clear();
        results
    }

    /// Embed one batch; if the batch call fails, retry chunk by chunk so
    /// failures are attributed exactly.
    fn embed_batch(&self, batch: &[Chunk]) -> Vec<Result<Vec<f32>, EmbedderError>> {
        let dims = self.embedder.dimensions();
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        match self.embedder.embed_batch(&texts) {
            Ok(vectors) if vectors.len() == batch.len() => vectors
                .into_iter()
                .map(|v| check_dimensions(&v, dims).map(|()| v))
                .collect(),
            Ok(vectors) => {
                debug!(
                    "Batch returned {} vectors for {} texts, retrying singly",
                    vectors.len(),
                    batch.len()
                );
                self.embed_singly(batch)
            }
            Err(e) => {
                debug!("Batch embedding failed ({e}), retrying singly");
                self.embed_singly(batch)
            }
        }
    }

    fn embed_singly(&self, batch: &[Chunk]) -> Vec<Result<Vec<f32>, EmbedderError>> {
        let dims = self.embedder.dimensions();
        batch
            .iter()
            .map(|c| {
                let v = self.embedder.embed(&c.text)?;
                check_dimensions(&v, dims)?;
                Ok(v)
            })
            .collect()
    }
}

/// Immediate, non-hidden subdirectories of `root`, sorted by name.
pub fn project_dirs(root: &Path) -> Result<Vec<(String, std::path::PathBuf)>, IndexError> {
    let io_err = |source| IndexError::Io {
        path: root.display().to_string(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            warn!("Skipping non-UTF-8 directory {}", path.display());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        dirs.push((name, path));
    }
    dirs.sort();
    Ok(dirs)
}

fn progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}
