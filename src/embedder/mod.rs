/// Embedder trait, shared error type and provider selection.
pub mod hashing;
pub mod ollama;

use thiserror::Error;

use crate::config::{ConfigError, EmbedderConfig};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync`; the index builder calls them
/// from a worker pool.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Identifier of the model producing the vectors.
    fn model_id(&self) -> &str;
}

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbedderConfig) -> Result<Box<dyn Embedder>, ConfigError> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(ollama::OllamaEmbedder::new(config)?)),
        "hashing" => Ok(Box::new(hashing::HashingEmbedder::new(config.dimensions))),
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

/// Reject vectors whose length differs from the configured dimensionality.
pub(crate) fn check_dimensions(vector: &[f32], expected: usize) -> Result<(), EmbedderError> {
    if vector.len() != expected {
        return Err(EmbedderError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return;
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    for v in vec.iter_mut() {
        *v *= inv_norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_create_embedder() {
        let mut config = EmbedderConfig {
            provider: "hashing".into(),
            dimensions: 64,
            ..EmbedderConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimensions(), 64);

        config.provider = "ollama".into();
        assert_eq!(create_embedder(&config).unwrap().model_id(), "all-minilm");

        config.provider = "word2vec".into();
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(&[0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dimensions(&[0.0; 3], 4),
            Err(EmbedderError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }
}
