use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Closed classification every transport failure maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Temporary server-side fault, worth retrying with the same input.
    TransientServerError,
    /// Provider declined to act on the instruction.
    ContentRejected,
    /// Provider answered successfully but no image reference could be extracted.
    MalformedResponse,
    /// Network, auth, quota and anything else.
    Unrecoverable,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::TransientServerError)
    }

    /// Whether a different instruction might succeed where this one did not.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            FailureKind::ContentRejected | FailureKind::MalformedResponse
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientServerError => "transient server error",
            FailureKind::ContentRejected => "content rejected",
            FailureKind::MalformedResponse => "malformed response",
            FailureKind::Unrecoverable => "unrecoverable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from one instruction's call sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
    pub status: Option<u16>,
    /// Transport calls made for this instruction before giving up.
    pub attempts: u32,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            attempts: 1,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientServerError, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ContentRejected, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unrecoverable, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} (HTTP {}, {} attempt(s)): {}",
                self.kind, status, self.attempts, self.message
            ),
            None => write!(
                f,
                "{} ({} attempt(s)): {}",
                self.kind, self.attempts, self.message
            ),
        }
    }
}

impl std::error::Error for ProviderFailure {}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image generation failed: {0}")]
    Provider(#[from] ProviderFailure),

    #[error("Image generation failed with both the original and the {decade} fallback instruction. Last error: {fallback}")]
    FallbackFailed {
        decade: String,
        primary: ProviderFailure,
        fallback: ProviderFailure,
    },
}

/// Coarse guidance for whoever renders the error to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserHint {
    TryLater,
    TryDifferentInput,
    Generic,
}

impl GenerationError {
    /// Classification of the failure that ended the request, if it came from the provider.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            GenerationError::Provider(failure) => Some(failure.kind),
            GenerationError::FallbackFailed { fallback, .. } => Some(fallback.kind),
            _ => None,
        }
    }

    pub fn fallback_attempted(&self) -> bool {
        matches!(self, GenerationError::FallbackFailed { .. })
    }

    pub fn user_hint(&self) -> UserHint {
        match self {
            GenerationError::FallbackFailed { .. } => UserHint::TryDifferentInput,
            GenerationError::Provider(failure) => match failure.kind {
                FailureKind::TransientServerError => UserHint::TryLater,
                FailureKind::ContentRejected | FailureKind::MalformedResponse => {
                    UserHint::TryDifferentInput
                }
                FailureKind::Unrecoverable => UserHint::Generic,
            },
            _ => UserHint::Generic,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
