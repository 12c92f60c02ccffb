//! Prompt assembly: slot templating plus a rank-ordered context budget.
//!
//! Templates use `{name}` slots. `{context}` is mandatory; the other known
//! slots are `{project}`, `{module}`, `{query}`, `{language}` and `{sample}`.
//! Substitution is a single pass, so braces inside retrieved text or the
//! sample are never expanded.
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::warn;

use crate::db::SearchHit;

static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const DEFAULT_TEMPLATE: &str = r#"You are a senior software test engineer. Write in {language}.

Project: {project}
Module: {module}

Here is an example of the expected test document format:

```
{sample}
```

Following that format, write test cases for the material below.

{context}

Request: {query}

Produce a Markdown table with exactly these six columns: Test Item, Description, Test Steps, Expected Result, Test Type, Priority. Base every row on the API specifications and UI flows above.
"#;

pub const DEFAULT_SAMPLE: &str = r#"## Login

| Test Item | Description | Test Steps | Expected Result | Test Type | Priority |
|---|---|---|---|---|---|
| Valid login | User signs in with correct credentials | 1. Open app 2. Enter account and password 3. Tap Login | Home screen is shown | Functional | High |
| Wrong password | Login is refused for a bad password | 1. Enter account 2. Enter wrong password 3. Tap Login | Error message, user stays on login screen | Negative | High |
"#;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("template uses unknown slot {{{0}}}")]
    UnknownSlot(String),

    #[error("template has no {{context}} slot")]
    MissingContextSlot,

    #[error("no retrieved chunk fits the {budget}-char context budget (smallest needs {needed})")]
    NoContextFits { budget: usize, needed: usize },
}

/// Values for one prompt. `params` holds every slot except `context`.
#[derive(Debug, Clone)]
pub struct PromptSlots<'a> {
    pub hits: &'a [SearchHit],
    pub params: BTreeMap<&'static str, String>,
}

impl<'a> PromptSlots<'a> {
    pub fn new(hits: &'a [SearchHit], project: &str, module: &str, query: &str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("project", project.to_string());
        params.insert("module", module.to_string());
        params.insert("query", query.to_string());
        params.insert("language", "English".to_string());
        params.insert("sample", DEFAULT_SAMPLE.to_string());
        Self { hits, params }
    }

    #[must_use]
    pub fn language(mut self, language: &str) -> Self {
        self.params.insert("language", language.to_string());
        self
    }

    #[must_use]
    pub fn sample(mut self, sample: &str) -> Self {
        self.params.insert("sample", sample.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub text: String,
    /// Chunks that made it into `{context}`, in rank order.
    pub included: usize,
    /// Lowest-ranked chunks left out to respect the budget.
    pub dropped: usize,
}

/// One context entry: a numbered source header, then the chunk text.
fn format_entry(rank: usize, hit: &SearchHit) -> String {
    let chunk = &hit.chunk;
    let location = match chunk.page {
        Some(page) => format!("page {page}, offset {}", chunk.offset),
        None => format!("offset {}", chunk.offset),
    };
    format!(
        "[{rank}] {} ({location}, score {:.3})\n{}",
        chunk.source_path, hit.score, chunk.text
    )
}

/// Keep the best-ranked entries whose joined length fits `budget` chars.
///
/// Entries are whole or absent: the first one that overflows and every
/// lower-ranked one after it are dropped.
fn build_context(hits: &[SearchHit], budget: usize) -> Result<(String, usize), PromptError> {
    let sep_len = CONTEXT_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for (i, hit) in hits.iter().enumerate() {
        let entry = format_entry(i + 1, hit);
        let cost = entry.chars().count() + if included > 0 { sep_len } else { 0 };
        if used + cost > budget {
            if included == 0 {
                return Err(PromptError::NoContextFits {
                    budget,
                    needed: entry.chars().count(),
                });
            }
            break;
        }
        if included > 0 {
            context.push_str(CONTEXT_SEPARATOR);
        }
        context.push_str(&entry);
        used += cost;
        included += 1;
    }
    Ok((context, included))
}

/// Fill `template` with `slots`, fitting the retrieved context into
/// `max_context_chars`.
pub fn assemble(
    template: &str,
    slots: &PromptSlots<'_>,
    max_context_chars: usize,
) -> Result<AssembledPrompt, PromptError> {
    let mut has_context = false;
    for caps in SLOT_RE.captures_iter(template) {
        let name = &caps[1];
        if name == "context" {
            has_context = true;
        } else if !slots.params.contains_key(name) {
            return Err(PromptError::UnknownSlot(name.to_string()));
        }
    }
    if !has_context {
        return Err(PromptError::MissingContextSlot);
    }

    let (context, included) = build_context(slots.hits, max_context_chars)?;
    let dropped = slots.hits.len() - included;
    if dropped > 0 {
        warn!(
            "Context budget of {max_context_chars} chars reached: dropped {dropped} of {} chunks",
            slots.hits.len()
        );
    }

    let text = SLOT_RE
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "context" => context.clone(),
            name => slots.params.get(name).cloned().unwrap_or_default(),
        })
        .into_owned();

    Ok(AssembledPrompt {
        text,
        included,
        dropped,
    })
}
