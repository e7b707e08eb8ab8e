// src/error.rs
use thiserror::Error;

/// A login form found in place of the requested page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// Absolute URL the form posts to.
    pub action: String,
    /// Hidden and pre-filled inputs (csrf tokens etc.), in document order.
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("login required at {url}")]
    AuthRequired { url: String, form: LoginForm },
}

impl FetchError {
    pub fn network(url: &str, reason: impl ToString) -> Self {
        FetchError::Network { url: url.to_string(), reason: reason.to_string() }
    }

    /// Worth another attempt under the retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::AuthRequired { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("table not found: {0}")]
    MissingTable(String),

    #[error("missing markup: {0}")]
    Missing(String),

    #[error("bad value {value:?} for {field}")]
    BadValue { field: String, value: String },

    #[error("bad selector {0:?}")]
    Selector(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is not supported by this adapter")]
    Unsupported(&'static str),
}
