//! Error types for treegp

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// treegp errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Grammar error: {0}")]
    GrammarInvalid(String),

    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Infeasible construction: {0}")]
    InfeasibleConstruction(String),

    #[error("{operator} exhausted after {attempts} attempts")]
    MutationExhausted {
        operator: &'static str,
        attempts: usize,
    },

    #[error("No compatible replacement: {0}")]
    NoCompatibleReplacement(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failure came from exhausted retries or infeasibility,
    /// i.e. another attempt with a different random stream may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::InfeasibleConstruction(_) | Error::MutationExhausted { .. }
        )
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
