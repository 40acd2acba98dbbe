//! System prompt loading.
//!
//! Resolution order: the SYSTEM_PROMPT environment variable, then the
//! configured prompt file, then an empty string. The resolved prompt is
//! cached in memory after the first load; [`PromptLoader::clear`] drops
//! the cached value.

use std::path::PathBuf;
use std::sync::RwLock;

/// Environment variable that overrides the prompt file.
pub const SYSTEM_PROMPT_ENV_VAR: &str = "SYSTEM_PROMPT";

/// Caching loader for the base system prompt.
pub struct PromptLoader {
    file: Option<PathBuf>,
    cached: RwLock<Option<String>>,
}

impl PromptLoader {
    /// Create a loader backed by an optional prompt file.
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            cached: RwLock::new(None),
        }
    }

    /// Return the system prompt, loading and caching it on first use.
    ///
    /// The env var is checked on every call so it always wins, matching
    /// the resolution order documented above.
    pub fn get(&self) -> String {
        if let Ok(prompt) = std::env::var(SYSTEM_PROMPT_ENV_VAR) {
            if !prompt.is_empty() {
                return prompt;
            }
        }

        if let Some(cached) = self.cached.read().ok().and_then(|c| c.clone()) {
            return cached;
        }

        let prompt = self.load_from_file();
        if let Ok(mut slot) = self.cached.write() {
            *slot = Some(prompt.clone());
        }
        prompt
    }

    /// Drop the cached prompt so the next `get` re-reads the file.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.cached.write() {
            *slot = None;
        }
    }

    fn load_from_file(&self) -> String {
        let Some(path) = &self.file else {
            tracing::info!("No system prompt file configured, using empty prompt");
            return String::new();
        };

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let trimmed = content.trim().to_string();
                if trimmed.is_empty() {
                    tracing::warn!(path = %path.display(), "System prompt file is empty");
                } else {
                    tracing::info!(path = %path.display(), "Loaded system prompt from file");
                }
                trimmed
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read system prompt file");
                String::new()
            }
        }
    }
}
