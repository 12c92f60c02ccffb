//! Document loading.
//!
//! A file's extension resolves once to a [`SourceType`]; each variant knows
//! how to turn the file into zero or more [`DocumentRecord`]s. Failures are
//! per file: [`load_project_dir`] logs them and carries on with the rest.

pub mod docx;
pub mod pdf;
pub mod text;

use std::fmt;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while loading a single file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    Encoding { path: String },

    #[error("PDF extraction failed for {path}: {message}")]
    Pdf { path: String, message: String },

    #[error("DOCX extraction failed for {path}: {message}")]
    Docx { path: String, message: String },

    #[error("YAML parse failed for {path}: {message}")]
    Yaml { path: String, message: String },
}

/// Closed set of document kinds, resolved from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Docx,
    Txt,
    Md,
    Yaml,
    Image,
    Unsupported,
}

impl SourceType {
    /// Map a path's extension (case-insensitive) to a source type.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" => Self::Txt,
            "md" | "markdown" => Self::Md,
            "yaml" | "yml" => Self::Yaml,
            "png" | "jpg" | "jpeg" => Self::Image,
            _ => Self::Unsupported,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Yaml => "yaml",
            Self::Image => "image",
            Self::Unsupported => "unsupported",
        }
    }

    /// Parse the stored form produced by [`SourceType::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" => Self::Txt,
            "md" => Self::Md,
            "yaml" => Self::Yaml,
            "image" => Self::Image,
            _ => Self::Unsupported,
        }
    }

    /// Load `path` as this source type.
    ///
    /// `Image` yields nothing (no text extractor) and `Unsupported` yields
    /// nothing; both are warnings at the call site, not errors.
    pub fn load(self, path: &Path, project: &str) -> Result<Vec<DocumentRecord>, LoadError> {
        let texts: Vec<(Option<u32>, String)> = match self {
            Self::Pdf => pdf::extract_pages(path)?
                .into_iter()
                .map(|(page, text)| (Some(page), text))
                .collect(),
            Self::Docx => vec![(None, docx::extract_text(path)?)],
            Self::Txt | Self::Md => vec![(None, text::read_utf8(path)?)],
            Self::Yaml => vec![(None, text::flatten_yaml(path)?)],
            Self::Image | Self::Unsupported => Vec::new(),
        };

        let source_path = normalize_path(path);
        Ok(texts
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(page, text)| DocumentRecord {
                text,
                source_path: source_path.clone(),
                source_type: self,
                project: project.to_string(),
                page,
            })
            .collect())
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw text of one loaded document (or one PDF page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub text: String,
    pub source_path: String,
    pub source_type: SourceType,
    pub project: String,
    /// 1-based page number for paginated sources.
    pub page: Option<u32>,
}

/// Load a single file, dispatching on its extension.
pub fn load(path: &Path, project: &str) -> Result<Vec<DocumentRecord>, LoadError> {
    SourceType::from_path(path).load(path, project)
}

/// Outcome of loading every file in one project directory.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub documents: Vec<DocumentRecord>,
    pub loaded_files: usize,
    pub skipped_files: Vec<PathBuf>,
    pub failed_files: Vec<(PathBuf, LoadError)>,
}

/// Load every supported file under `dir`, isolating per-file failures.
pub fn load_project_dir(dir: &Path, project: &str) -> LoadSummary {
    let mut summary = LoadSummary::default();

    for path in list_files(dir) {
        let kind = SourceType::from_path(&path);
        match kind {
            SourceType::Unsupported => {
                warn!("Skipping unsupported file: {}", path.display());
                summary.skipped_files.push(path);
                continue;
            }
            SourceType::Image => {
                warn!("No text extractor for image, skipping: {}", path.display());
                summary.skipped_files.push(path);
                continue;
            }
            _ => {}
        }

        match kind.load(&path, project) {
            Ok(records) => {
                debug!("Loaded {} record(s) from {}", records.len(), path.display());
                summary.loaded_files += 1;
                summary.documents.extend(records);
            }
            Err(e) => {
                warn!("Failed to load {}: {e}", path.display());
                summary.failed_files.push((path, e));
            }
        }
    }

    summary
}

/// Files under `dir` in a stable order. Respects `.gitignore`.
fn list_files(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir).hidden(true).build();
    let mut files: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Use forward slashes so stored paths are stable across platforms.
pub(crate) fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
