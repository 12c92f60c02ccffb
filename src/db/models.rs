use crate::chunker::Chunk;

/// One retrieved entry, scored against the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Insertion-ordered row id within the project index.
    pub id: i64,
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Facts recorded when an index was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub project: String,
    pub model_id: String,
    pub dimensions: usize,
    pub built_at: String,
    pub chunk_count: usize,
}
