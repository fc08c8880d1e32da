use thiserror::Error;

/// Errors surfaced by the cache port, detectors, and configuration loading.
///
/// No variant of this type is allowed to escape the orchestrator's response
/// path: every detector error is caught and replaced by a neutral fallback
/// before the evaluation is built.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("cache error: {0}")]
    Cache(String),

    #[error("operation timed out: {0}")]
    Timeout(&'static str),

    #[error("detector '{name}' failed: {source}")]
    Detector { name: &'static str, source: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
