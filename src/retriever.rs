//! Query-time retrieval against a built project index.
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{IndexError, IndexStore, SearchHit};
use crate::embedder::{Embedder, EmbedderError};

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("query text is empty")]
    EmptyQuery,
}

pub struct Retriever<'a, E: Embedder + ?Sized> {
    store: &'a IndexStore,
    embedder: &'a E,
}

impl<'a, E: Embedder + ?Sized> Retriever<'a, E> {
    pub fn new(store: &'a IndexStore, embedder: &'a E) -> Self {
        Self { store, embedder }
    }

    /// Top `k` chunks of `project` for `query`, best first.
    ///
    /// A project without a built index is [`IndexError::NotFound`], never an
    /// empty result. The shared lock is released before returning.
    pub fn retrieve(
        &self,
        project: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        // Checked before locking so a typo doesn't leave a lock file behind.
        if !self.store.exists(project) {
            return Err(IndexError::NotFound {
                project: project.to_string(),
            }
            .into());
        }

        let lock = self.store.lock_shared(project)?;
        let index = self.store.open(project, &lock)?;
        let meta = index.meta()?;
        if meta.model_id != self.embedder.model_id() {
            warn!(
                "Index for '{project}' was built with '{}', querying with '{}'",
                meta.model_id,
                self.embedder.model_id()
            );
        }

        let vector = self.embedder.embed(query)?;
        let hits = index.query(&vector, k)?;
        debug!("Retrieved {} chunks from '{project}'", hits.len());

        drop(index);
        drop(lock);
        Ok(hits)
    }
}
