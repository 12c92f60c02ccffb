//! Test-plan generation: retrieve, assemble, generate, validate, persist.
//!
//! Nothing is written unless every earlier step succeeded, and the index
//! lock is released before the generator is called.
pub mod store;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::info;

pub use store::PlanStore;

use crate::config::{Config, ConfigError, validate_project_name};
use crate::embedder::Embedder;
use crate::generator::{GenerationError, Generator, validate_response};
use crate::prompt::{self, DEFAULT_SAMPLE, DEFAULT_TEMPLATE, PromptError, PromptSlots};
use crate::retriever::{RetrievalError, Retriever};

#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no free serial left in {dir} for {date}")]
    SerialsExhausted { dir: String, date: String },
}

impl PlanError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// What to generate. Scoped to one call; nothing is kept between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlanRequest {
    pub project: String,
    pub module: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTestPlan {
    pub markdown_text: String,
    pub project: String,
    pub module: String,
    pub timestamp: String,
    pub serial: u32,
    pub path: PathBuf,
    pub chunks_used: usize,
    pub chunks_dropped: usize,
}

/// Prompt and model settings resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub template: String,
    pub sample: String,
    pub language: String,
    pub model: String,
    pub top_k: usize,
    pub max_context_chars: usize,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            sample: DEFAULT_SAMPLE.to_string(),
            language: "English".to_string(),
            model: "mistral".to_string(),
            top_k: 10,
            max_context_chars: 12_000,
        }
    }
}

impl PlanSettings {
    /// Read template and sample overrides from disk, if configured.
    pub fn from_config(config: &Config) -> Result<Self, PlanError> {
        let read = |path: &Option<String>, fallback: &str| -> Result<String, PlanError> {
            match path {
                Some(p) => fs::read_to_string(p).map_err(|e| PlanError::io(Path::new(p), e)),
                None => Ok(fallback.to_string()),
            }
        };
        Ok(Self {
            template: read(&config.prompt.template_path, DEFAULT_TEMPLATE)?,
            sample: read(&config.prompt.sample_path, DEFAULT_SAMPLE)?,
            language: config.prompt.language.clone(),
            model: config.generator.model.clone(),
            top_k: config.search_top_k,
            max_context_chars: config.max_context_chars,
        })
    }
}

pub struct PlanGenerator<'a, E: Embedder + ?Sized, G: Generator + ?Sized> {
    retriever: Retriever<'a, E>,
    generator: &'a G,
    store: PlanStore,
    settings: PlanSettings,
}

impl<'a, E: Embedder + ?Sized, G: Generator + ?Sized> PlanGenerator<'a, E, G> {
    pub fn new(
        retriever: Retriever<'a, E>,
        generator: &'a G,
        store: PlanStore,
        settings: PlanSettings,
    ) -> Self {
        Self {
            retriever,
            generator,
            store,
            settings,
        }
    }

    /// Generate and persist a plan dated today.
    pub fn generate(&self, request: &TestPlanRequest) -> Result<GeneratedTestPlan, PlanError> {
        self.generate_on(request, Local::now().date_naive())
    }

    /// Generate and persist a plan whose filename carries `date`.
    pub fn generate_on(
        &self,
        request: &TestPlanRequest,
        date: NaiveDate,
    ) -> Result<GeneratedTestPlan, PlanError> {
        validate_project_name(&request.project)?;
        validate_project_name(&request.module)?;

        // The retriever drops its shared lock before returning.
        let hits = self.retriever.retrieve(
            &request.project,
            &request.query,
            self.settings.top_k,
        )?;

        let slots = PromptSlots::new(&hits, &request.project, &request.module, &request.query)
            .language(&self.settings.language)
            .sample(&self.settings.sample);
        let assembled = prompt::assemble(
            &self.settings.template,
            &slots,
            self.settings.max_context_chars,
        )?;
        let prompt_chars = assembled.text.chars().count();

        let raw = self.generator.generate(&assembled.text, &self.settings.model)?;
        let markdown = validate_response(&raw, prompt_chars)?;

        let (serial, path) =
            self.store
                .persist(&request.project, &request.module, date, &markdown)?;
        info!("Test plan written to {}", path.display());

        Ok(GeneratedTestPlan {
            markdown_text: markdown,
            project: request.project.clone(),
            module: request.module.clone(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            serial,
            path,
            chunks_used: assembled.included,
            chunks_dropped: assembled.dropped,
        })
    }
}
