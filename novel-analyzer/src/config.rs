//! Application configuration loaded from environment variables
//!
//! Call `dotenv::dotenv().ok()` before [`Settings::from_env`] so a local
//! `.env` file is honored, then apply any CLI overrides on the returned
//! struct.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Default chunk size in characters
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 20_000;

/// Default concurrency limit for the extraction backend
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Default model for the extraction backend
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Default OpenAI-compatible API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    /// Directory scanned for manuscript `.txt` files
    pub project_text_dir: PathBuf,
    /// Directory that receives persisted analysis reports
    pub analysis_output_dir: PathBuf,
    pub max_chunk_chars: usize,
    pub chunk_overlap: usize,
    pub max_concurrent_requests: usize,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        let openai_api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set (see .env)")?;

        let max_chunk_chars = optional_usize("MAX_CHUNK_CHARS")?.unwrap_or(DEFAULT_MAX_CHUNK_CHARS);
        let chunk_overlap =
            optional_usize("CHUNK_OVERLAP")?.unwrap_or_else(|| default_overlap(max_chunk_chars));

        Ok(Self {
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            project_text_dir: env::var("PROJECT_TEXT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./texts")),
            analysis_output_dir: env::var("ANALYSIS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./analysis")),
            max_chunk_chars,
            chunk_overlap,
            max_concurrent_requests: optional_usize("MAX_CONCURRENT_REQUESTS")?
                .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS),
        })
    }

    /// Project directory, created if missing
    pub fn resolved_project_dir(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.project_text_dir).with_context(|| {
            format!(
                "Failed to create project directory: {}",
                self.project_text_dir.display()
            )
        })?;
        Ok(self.project_text_dir.clone())
    }

    /// Output directory, created if missing
    pub fn resolved_output_dir(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.analysis_output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.analysis_output_dir.display()
            )
        })?;
        Ok(self.analysis_output_dir.clone())
    }
}

/// Recommended overlap for a given chunk size
pub fn default_overlap(max_chars: usize) -> usize {
    200.min(max_chars / 10)
}

fn optional_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(value) => {
            let parsed = value
                .parse::<usize>()
                .with_context(|| format!("{} must be a positive integer, got '{}'", name, value))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
