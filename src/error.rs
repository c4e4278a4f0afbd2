use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not detect a business module from the question")]
    NoModuleDetected,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Refinement exhausted: {0}")]
    RefinementExhausted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
