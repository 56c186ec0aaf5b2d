use thiserror::Error;

/// Every failure the bridge can report.
///
/// Cloneable so one failed exchange can be handed to every caller that joined
/// it; foreign errors are captured as their display text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Prompt input not found: {0}")]
    InputNotFound(String),

    #[error("Prompt input mismatch: expected {expected:?}, found {actual:?}")]
    InputMismatch { expected: String, actual: String },

    #[error("Completion timeout: {0}")]
    CompletionTimeout(String),

    #[error("Reply extraction failed: {0}")]
    Extraction(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable name reported to HTTP clients in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Validation(_) => "ValidationError",
            Error::SessionCreation(_) => "SessionCreationFailure",
            Error::SessionClosed(_) => "SessionClosed",
            Error::InputNotFound(_) => "InputNotFound",
            Error::InputMismatch { .. } => "InputMismatch",
            Error::CompletionTimeout(_) => "CompletionTimeout",
            Error::Extraction(_) => "ExtractionFailure",
            Error::Browser(_) => "BrowserError",
            Error::Timeout(_) => "Timeout",
            Error::NotFound(_) => "NotFound",
            Error::Other(_) => "InternalError",
        }
    }

    /// The message without the kind prefix (`details` on the wire).
    pub fn details(&self) -> String {
        match self {
            Error::Config(m)
            | Error::Io(m)
            | Error::Json(m)
            | Error::Validation(m)
            | Error::SessionCreation(m)
            | Error::SessionClosed(m)
            | Error::InputNotFound(m)
            | Error::CompletionTimeout(m)
            | Error::Extraction(m)
            | Error::Browser(m)
            | Error::Timeout(m)
            | Error::NotFound(m)
            | Error::Other(m) => m.clone(),
            Error::InputMismatch { expected, actual } => {
                format!("expected {:?}, found {:?}", expected, actual)
            }
        }
    }

    /// True for failures caused by the caller rather than the bridge.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
