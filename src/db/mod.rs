//! Per-project vector index using SQLite and sqlite-vec.
//!
//! One database file per project (`{index_dir}/{project}/index.db`) holds
//! the chunk rows, a `vec0` table with their embeddings, and a small
//! key/value table describing how the index was built.
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ConfigError;

pub mod models;
pub mod records;
pub mod search;
pub mod store;

pub use models::{IndexMeta, SearchHit};
pub use store::{IndexStore, ProjectLock, StagedIndex};

/// File name of the database inside a project's index directory.
pub const INDEX_FILE: &str = "index.db";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    source_path TEXT NOT NULL,
    source_type TEXT NOT NULL,
    page INTEGER,
    char_offset INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_path);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Errors raised by the vector index and its on-disk store.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index for project '{project}' not found; build it first")]
    NotFound { project: String },

    #[error("index for project '{project}' is locked ({reason}); retry later")]
    Locked {
        project: String,
        reason: &'static str,
    },

    #[error("query vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("all {0} chunks failed to embed")]
    AllEmbeddingsFailed(usize),

    #[error("index I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A project's vector index: an open SQLite connection plus the facts
/// needed to validate queries against it.
pub struct VectorIndex {
    pub(crate) conn: Connection,
    project: String,
    dimensions: usize,
}

impl VectorIndex {
    /// Create a fresh index file at `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        project: &str,
        dimensions: usize,
        model_id: &str,
    ) -> Result<Self, IndexError> {
        let path = path.as_ref();
        info!("Creating index for '{project}': {}", path.display());
        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::initialize(conn, project, dimensions, model_id)
    }

    /// Create an in-memory index (useful for testing).
    pub fn open_in_memory(project: &str, dimensions: usize) -> Result<Self, IndexError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, project, dimensions, "in-memory")
    }

    /// Open an existing index read-only.
    ///
    /// A missing file or an index with no entries is [`IndexError::NotFound`].
    pub fn open<P: AsRef<Path>>(path: P, project: &str) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IndexError::NotFound {
                project: project.to_string(),
            });
        }
        init_sqlite_vec();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let dimensions: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| {
                debug!("Index at {} unreadable: {e}", path.display());
                IndexError::NotFound {
                    project: project.to_string(),
                }
            })?;
        let dimensions = dimensions
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or_else(|| IndexError::NotFound {
                project: project.to_string(),
            })?;

        Ok(Self {
            conn,
            project: project.to_string(),
            dimensions,
        })
    }

    fn initialize(
        conn: Connection,
        project: &str,
        dimensions: usize,
        model_id: &str,
    ) -> Result<Self, IndexError> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        let meta = [
            ("project", project.to_string()),
            ("dimensions", dimensions.to_string()),
            ("model_id", model_id.to_string()),
            ("built_at", chrono::Utc::now().to_rfc3339()),
        ];
        for (key, value) in meta {
            conn.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)",
                params![key, value],
            )?;
        }

        Ok(Self {
            conn,
            project: project.to_string(),
            dimensions,
        })
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Serialize a float32 vector into the little-endian blob `vec0` expects.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        return bytemuck::cast_slice::<f32, u8>(vec).to_vec();
    }
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}
