//! Generator trait and response validation.
//!
//! The model itself is external. This module only defines the call boundary
//! and decides whether what came back is a usable test plan.
pub mod ollama;

use thiserror::Error;

pub use ollama::OllamaGenerator;

/// A failed generation. Every variant carries the size of the prompt that
/// was sent so failures can be diagnosed without re-running retrieval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generator unavailable: {message} (prompt was {prompt_chars} chars)")]
    Unavailable { message: String, prompt_chars: usize },

    #[error("generator timed out (prompt was {prompt_chars} chars)")]
    Timeout { prompt_chars: usize },

    #[error("generator returned an empty response (prompt was {prompt_chars} chars)")]
    Empty { prompt_chars: usize },

    #[error("malformed response: {reason} (prompt was {prompt_chars} chars)")]
    Malformed { reason: String, prompt_chars: usize },
}

impl GenerationError {
    #[must_use]
    pub fn prompt_chars(&self) -> usize {
        match self {
            Self::Unavailable { prompt_chars, .. }
            | Self::Timeout { prompt_chars }
            | Self::Empty { prompt_chars }
            | Self::Malformed { prompt_chars, .. } => *prompt_chars,
        }
    }
}

pub trait Generator: Send + Sync {
    /// Run `prompt` through `model_id` and return the raw response text.
    fn generate(&self, prompt: &str, model_id: &str) -> Result<String, GenerationError>;
}

/// Strip a fence wrapping the whole response (```` ```markdown ... ``` ````).
fn unwrap_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed;
    }
    let inner = &trimmed[3..trimmed.len() - 3];
    // Drop the info string (`markdown`, `md`, ...) on the opening line.
    match inner.find('\n') {
        Some(pos) => inner[pos + 1..].trim(),
        None => inner.trim(),
    }
}

fn is_separator_row(line: &str) -> bool {
    let line = line.trim();
    line.contains('|')
        && line.contains("---")
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn has_table(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    lines
        .windows(2)
        .any(|pair| pair[0].trim_start().starts_with('|') && is_separator_row(pair[1]))
}

/// Check a raw response and return the markdown to persist.
///
/// The response must be non-empty and contain a markdown table (a `|` header
/// row followed by a `|---|` separator row).
pub fn validate_response(raw: &str, prompt_chars: usize) -> Result<String, GenerationError> {
    let text = unwrap_fence(raw);
    if text.is_empty() {
        return Err(GenerationError::Empty { prompt_chars });
    }
    if !has_table(text) {
        return Err(GenerationError::Malformed {
            reason: "no markdown table found".into(),
            prompt_chars,
        });
    }
    let mut out = text.to_string();
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "| Item | Result |\n|---|---|\n| Login | OK |";

    #[test]
    fn test_accepts_table() {
        let text = format!("# Plan\n\n{TABLE}\n");
        assert_eq!(validate_response(&text, 10).unwrap(), text.trim().to_string() + "\n");
    }

    #[test]
    fn test_unwraps_fenced_response() {
        let fenced = format!("```markdown\n{TABLE}\n```");
        assert_eq!(validate_response(&fenced, 10).unwrap(), format!("{TABLE}\n"));
    }

    #[test]
    fn test_alignment_separator() {
        let text = "| A | B |\n| :--- | ---: |\n| 1 | 2 |";
        assert!(validate_response(text, 1).is_ok());
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(
            validate_response("  \n ", 42).unwrap_err(),
            GenerationError::Empty { prompt_chars: 42 }
        );
        assert_eq!(
            validate_response("```\n```", 7).unwrap_err().prompt_chars(),
            7
        );
    }

    #[test]
    fn test_prose_without_table_is_malformed() {
        let err = validate_response("I cannot help with that.", 99).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed { prompt_chars: 99, .. }));
    }
}
