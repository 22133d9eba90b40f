use thiserror::Error;

/// Error types for mnemonic search and key derivation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid word count: expected {expected}, got {actual}")]
    InvalidWordCount { expected: usize, actual: usize },

    #[error("Unknown word: {0}")]
    UnknownWord(String),

    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    #[error("Invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Candidate index {index} out of range (total {total})")]
    IndexOutOfRange { index: u64, total: u64 },

    #[error("Search space too large: {0}")]
    SearchSpaceTooLarge(String),

    #[error("Invalid child key at index {0:#010x}")]
    InvalidChildKey(u32),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid checksum")]
    InvalidChecksum,

    #[error("Base58 decoding error: {0}")]
    Base58DecodeError(String),

    #[error("HMAC error")]
    HmacError,

    #[error("Seed derivation failed: {0}")]
    SeedDerivation(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Search aborted at candidate {index}: {source}")]
    SearchAborted {
        index: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the search coordinator to decide between
/// skipping a candidate, retrying a batch and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input; retrying with the same input cannot succeed.
    Input,
    /// The candidate being processed is unusable.
    Derivation,
    /// Reported by the compute backend, which classifies itself.
    Backend,
    /// The key-stretching primitive failed.
    SeedDerivation,
    /// I/O and configuration-file problems outside the core.
    Environment,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidWordCount { .. }
            | Error::UnknownWord(_)
            | Error::InvalidScalar(_)
            | Error::InvalidVocabulary(_)
            | Error::InvalidDerivationPath(_)
            | Error::InvalidAddress(_)
            | Error::InvalidConfig(_)
            | Error::IndexOutOfRange { .. }
            | Error::SearchSpaceTooLarge(_) => ErrorKind::Input,
            Error::InvalidChildKey(_)
            | Error::InvalidKey(_)
            | Error::InvalidChecksum
            | Error::Base58DecodeError(_)
            | Error::HmacError => ErrorKind::Derivation,
            Error::SeedDerivation(_) => ErrorKind::SeedDerivation,
            Error::Backend(_) => ErrorKind::Backend,
            Error::SearchAborted { source, .. } => source.kind(),
            Error::Io(_) | Error::Json(_) => ErrorKind::Environment,
        }
    }
}

/// How a backend failure should be handled by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Retry the same batch.
    Transient,
    /// Abort the search.
    Fatal,
}

/// Failure reported by a compute backend for one dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} backend error: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        BackendError {
            kind: BackendErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        BackendError {
            kind: BackendErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind == BackendErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::UnknownWord("x".into()).kind(), ErrorKind::Input);
        assert_eq!(Error::InvalidChildKey(0).kind(), ErrorKind::Derivation);
        assert_eq!(
            Error::SeedDerivation("broken".into()).kind(),
            ErrorKind::SeedDerivation
        );
        assert_eq!(
            Error::from(BackendError::fatal("lost device")).kind(),
            ErrorKind::Backend
        );
    }

    #[test]
    fn test_aborted_search_keeps_inner_kind() {
        let err = Error::SearchAborted {
            index: 42,
            source: Box::new(Error::from(BackendError::fatal("lost device"))),
        };
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_backend_error_classification() {
        assert!(BackendError::transient("busy").is_recoverable());
        assert!(!BackendError::fatal("gone").is_recoverable());
    }
}
