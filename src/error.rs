use std::fmt;

/// Errors raised while loading the student records file
///
/// All of these are fatal at startup: the dataset is the foundation of every
/// page and is never reloaded.
#[derive(Debug)]
pub enum LoadError {
    /// The file could not be opened or read
    Io(std::io::Error),

    /// The CSV was malformed (ragged rows, bad UTF-8, ...)
    Csv(csv::Error),

    /// The file had no header row
    Empty,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(err) => write!(f, "IO error: {err}"),
            LoadError::Csv(err) => write!(f, "CSV error: {err}"),
            LoadError::Empty => write!(f, "CSV file has no header row"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(err) => Some(err),
            LoadError::Csv(err) => Some(err),
            LoadError::Empty => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::Io(err)
    }
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        LoadError::Csv(err)
    }
}

/// Failure categories reported by a chat-completion backend
#[derive(Debug)]
pub enum CompletionError {
    /// The API key was missing or refused (401/403)
    Unauthorized(String),

    /// The service asked us to slow down (429)
    RateLimited(String),

    /// The service failed on its side (5xx)
    Server { status: u16, body: String },

    /// Connection, DNS or timeout failure before a response arrived
    Network(String),

    /// The request itself was refused (any other 4xx)
    Rejected { status: u16, body: String },

    /// A 2xx response that did not carry any generated text
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether a retry has a reasonable chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited(_)
                | CompletionError::Server { .. }
                | CompletionError::Network(_)
        )
    }

    /// Short category name used in log lines
    pub fn category(&self) -> &'static str {
        match self {
            CompletionError::Unauthorized(_) => "unauthorized",
            CompletionError::RateLimited(_) => "rate_limited",
            CompletionError::Server { .. } => "server_error",
            CompletionError::Network(_) => "network",
            CompletionError::Rejected { .. } => "rejected",
            CompletionError::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            CompletionError::RateLimited(msg) => write!(f, "Rate limited: {msg}"),
            CompletionError::Server { status, body } => {
                write!(f, "Server error {status}: {body}")
            }
            CompletionError::Network(msg) => write!(f, "Network error: {msg}"),
            CompletionError::Rejected { status, body } => {
                write!(f, "Request rejected with {status}: {body}")
            }
            CompletionError::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
        }
    }
}

impl std::error::Error for CompletionError {}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return CompletionError::InvalidResponse(err.to_string());
        }
        let description = std::error::Error::source(&err)
            .map(|e| e.to_string())
            .unwrap_or_else(|| err.to_string());
        CompletionError::Network(description)
    }
}
