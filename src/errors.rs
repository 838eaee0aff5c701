use thiserror::Error;

/// Errors raised while checking a row, before any network access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("selected requires repositories")]
    SelectedRequiresRepositories,
    #[error("repositories given without selected visibility")]
    RepositoriesWithoutSelected,
    #[error("unknown item type '{0}' (expected org_secret, org_variable, repo_secret or repo_variable)")]
    UnknownType(String),
    #[error("unknown visibility '{0}' (expected all, private or selected)")]
    UnknownVisibility(String),
    #[error("invalid name: {0}")]
    Name(String),
    #[error("invalid repository: {0}")]
    Repository(String),
    #[error("no value given for '{0}'")]
    MissingValue(String),
    #[error("variable '{0}' was given a write-only secret value")]
    SecretValueForVariable(String),
}

/// Errors raised while sealing a secret value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealingError {
    #[error("public key is not valid base64: {0}")]
    Decode(String),
    #[error("public key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },
    #[error("sealed box encryption failed: {0}")]
    Encrypt(String),
}

/// Errors that can occur while reconciling items against GitHub.
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("public key unavailable for {target}: {reason}")]
    KeyUnavailable { target: String, reason: String },
    #[error("failed to seal secret: {0}")]
    Sealing(#[from] SealingError),
    #[error("GitHub API rejected the request (status {status}): {body}")]
    RequestRejected { status: u16, body: String },
    #[error("gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
    #[error("run aborted before any row was attempted: {0}")]
    RunFatal(String),
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("could not build request: {0}")]
    InvalidRequest(String),
    #[error("unexpected response from GitHub: {0}")]
    InvalidResponse(String),
}

/// Payload-free classification of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    KeyUnavailable,
    Sealing,
    RequestRejected,
    ExhaustedRetries,
    RunFatal,
    Transport,
    InvalidRequest,
    InvalidResponse,
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Validation(_) => ErrorKind::Validation,
            ReconcileError::KeyUnavailable { .. } => ErrorKind::KeyUnavailable,
            ReconcileError::Sealing(_) => ErrorKind::Sealing,
            ReconcileError::RequestRejected { .. } => ErrorKind::RequestRejected,
            ReconcileError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            ReconcileError::RunFatal(_) => ErrorKind::RunFatal,
            ReconcileError::Transport(_) => ErrorKind::Transport,
            ReconcileError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ReconcileError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// HTTP status of a rejected request, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ReconcileError::RequestRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether sending the same request again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Transport(_))
    }
}

impl From<octocrab::Error> for ReconcileError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => ReconcileError::RequestRejected {
                status: source.status_code.as_u16(),
                body: source.message,
            },
            octocrab::Error::Serde { source, .. } => {
                ReconcileError::InvalidResponse(source.to_string())
            }
            octocrab::Error::Json { source, .. } => {
                ReconcileError::InvalidResponse(source.to_string())
            }
            // Connection, TLS and timeout failures surface from the service stack.
            octocrab::Error::Service { .. } | octocrab::Error::Hyper { .. } => {
                ReconcileError::Transport(err.to_string())
            }
            _ => ReconcileError::InvalidRequest(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        ReconcileError::InvalidResponse(err.to_string())
    }
}
