use super::{IndexError, SearchHit, VectorIndex, serialize_vector};
use crate::chunker::Chunk;
use crate::loader::SourceType;
use rusqlite::params;

// Undefined cosine distances (zero vectors) come back as NULL; treat them as
// orthogonal so they neither crash the mapping nor sort ahead of real hits.
const QUERY_SQL: &str = r#"
    SELECT
        c.id,
        c.content,
        c.source_path,
        c.project,
        c.char_offset,
        c.source_type,
        c.page,
        COALESCE(vec_distance_cosine(v.embedding, ?1), 1.0) AS distance
    FROM vec_chunks v
    JOIN chunks c ON v.rowid = c.id
    ORDER BY distance ASC, c.id ASC
    LIMIT ?2
"#;

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHit> {
    let distance: f64 = row.get(7)?;
    let source_type: String = row.get(5)?;

    Ok(SearchHit {
        id: row.get(0)?,
        chunk: Chunk {
            text: row.get(1)?,
            source_path: row.get(2)?,
            project: row.get(3)?,
            offset: row.get::<_, i64>(4)? as usize,
            source_type: SourceType::parse(&source_type),
            page: row.get(6)?,
        },
        score: (1.0 - distance) as f32,
    })
}

impl VectorIndex {
    /// Return the `k` entries most similar to `query_vector` by cosine
    /// similarity, best first; ties keep insertion order.
    ///
    /// `k` larger than the index returns every entry. An empty index is
    /// [`IndexError::NotFound`].
    pub fn query(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }
        if self.is_empty()? {
            return Err(IndexError::NotFound {
                project: self.project.clone(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(QUERY_SQL)?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), k.min(i64::MAX as usize) as i64],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_path: format!("input/demo/{text}.txt"),
            project: "demo".into(),
            offset: 0,
            source_type: SourceType::Txt,
            page: None,
        }
    }

    fn seeded() -> VectorIndex {
        let mut index = VectorIndex::open_in_memory("demo", 3).unwrap();
        index.add(&[1.0, 0.0, 0.0], &chunk("east")).unwrap();
        index.add(&[0.0, 1.0, 0.0], &chunk("north")).unwrap();
        index.add(&[0.7, 0.7, 0.0], &chunk("northeast")).unwrap();
        index.add(&[-1.0, 0.0, 0.0], &chunk("west")).unwrap();
        index
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let index = seeded();
        let results = index.query(&[1.0, 0.1, 0.0], 3).unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "northeast", "north"]);
        assert!(results[0].score > 0.99);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_k_larger_than_index_returns_all() {
        let index = seeded();
        let results = index.query(&[0.0, 0.0, 1.0], 50).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.last().unwrap().score <= results[0].score);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut index = VectorIndex::open_in_memory("demo", 2).unwrap();
        for name in ["first", "second", "third"] {
            index.add(&[0.6, 0.8], &chunk(name)).unwrap();
        }
        let results = index.query(&[0.6, 0.8], 3).unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_index_is_not_found() {
        let index = VectorIndex::open_in_memory("demo", 3).unwrap();
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 5),
            Err(IndexError::NotFound { .. })
        ));
    }

    #[test]
    fn test_metadata_round_trips() {
        let mut index = VectorIndex::open_in_memory("demo", 2).unwrap();
        let mut c = chunk("paged");
        c.source_type = SourceType::Pdf;
        c.page = Some(3);
        c.offset = 420;
        index.add(&[1.0, 0.0], &c).unwrap();

        let hit = &index.query(&[1.0, 0.0], 1).unwrap()[0];
        assert_eq!(hit.chunk, c);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = seeded();
        assert!(matches!(
            index.query(&[1.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }
}
