use super::{IndexError, IndexMeta, VectorIndex, serialize_vector};
use crate::chunker::Chunk;
use rusqlite::{Transaction, params};
use std::collections::HashMap;

fn check_len(index: &VectorIndex, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != index.dimensions {
        return Err(IndexError::DimensionMismatch {
            expected: index.dimensions,
            actual: vector.len(),
        });
    }
    Ok(())
}

fn insert(tx: &Transaction<'_>, vector: &[f32], chunk: &Chunk) -> Result<i64, IndexError> {
    tx.execute(
        "INSERT INTO chunks (project, source_path, source_type, page, char_offset, content) VALUES (?, ?, ?, ?, ?, ?)",
        params![
            chunk.project,
            chunk.source_path,
            chunk.source_type.as_str(),
            chunk.page,
            chunk.offset as i64,
            chunk.text,
        ],
    )?;
    let chunk_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
        params![chunk_id, serialize_vector(vector)],
    )?;
    Ok(chunk_id)
}

impl VectorIndex {
    /// Append one entry. Duplicate text or metadata is allowed.
    pub fn add(&mut self, vector: &[f32], chunk: &Chunk) -> Result<i64, IndexError> {
        check_len(self, vector)?;
        let tx = self.conn.transaction()?;
        let id = insert(&tx, vector, chunk)?;
        tx.commit()?;
        Ok(id)
    }

    /// Append many entries in one transaction, in slice order.
    pub fn add_batch(&mut self, entries: &[(Vec<f32>, Chunk)]) -> Result<usize, IndexError> {
        for (vector, _) in entries {
            check_len(self, vector)?;
        }
        let tx = self.conn.transaction()?;
        for (vector, chunk) in entries {
            insert(&tx, vector, chunk)?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Build metadata recorded at creation time plus the current entry count.
    pub fn meta(&self) -> Result<IndexMeta, IndexError> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM index_meta")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
        let mut values: HashMap<String, String> = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            values.insert(key, value);
        }
        let mut take = |key: &str| values.remove(key).unwrap_or_default();

        Ok(IndexMeta {
            project: take("project"),
            model_id: take("model_id"),
            built_at: take("built_at"),
            dimensions: self.dimensions,
            chunk_count: self.len()?,
        })
    }
}
