//! Index building: turns a project's documents into a fresh vector index.
pub mod core;

pub use self::core::{BuildOptions, BuildReport, BuildStatus, IndexBuilder, project_dirs};
