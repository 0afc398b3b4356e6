//! Accessify - accessibility transformations for audio, images and documents
//!
//! This library accepts local files or URLs, classifies them, and runs them through
//! external AI inference services (speech-to-text, vision, document analysis) to
//! produce transcripts, captions, alt text and simplified language.

pub mod adapters;
pub mod audio;
pub mod cache;
pub mod cli;
pub mod config;
pub mod content;
pub mod handles;
pub mod output;
pub mod pipeline;
pub mod quota;
pub mod resolver;
pub mod utils;

use std::time::Duration;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use content::{AudioArtifact, ContentKind, ContentUnit, ServiceResult};
pub use pipeline::{Adapters, PreviewController, PreviewState, ProcessingState};
pub use quota::{CurrentUser, QuotaGate, QuotaType};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Error types raised by the processing pipeline
#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Content too large: {size} bytes exceeds limit of {limit} bytes")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("Failed to fetch content: {0}")]
    FetchFailed(String),

    #[error("Processing quota exceeded for {0}")]
    QuotaExceeded(QuotaType),

    #[error("Sign-in required before processing content")]
    AuthenticationRequired,

    #[error("Quota store error: {0}")]
    QuotaStore(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Document parsing failed: {0}")]
    DocumentParseFailed(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Processing timeout exceeded")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure classes used to decide how a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any network call
    Validation,
    /// The quota gate denied the request
    QuotaExceeded,
    /// Network, HTTP or remote service failure
    Transport,
    /// The session was superseded or cancelled
    Cancelled,
    /// The session ran past its wall-clock budget
    Timeout,
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::Validation(_)
            | ProcessingError::UnsupportedFileType(_)
            | ProcessingError::InvalidUrl(_)
            | ProcessingError::ContentTooLarge { .. }
            | ProcessingError::AuthenticationRequired => ErrorKind::Validation,
            ProcessingError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            ProcessingError::Cancelled => ErrorKind::Cancelled,
            ProcessingError::Timeout(_) => ErrorKind::Timeout,
            ProcessingError::FetchFailed(_)
            | ProcessingError::QuotaStore(_)
            | ProcessingError::TranscriptionFailed(_)
            | ProcessingError::SynthesisFailed(_)
            | ProcessingError::AnalysisFailed(_)
            | ProcessingError::DocumentParseFailed(_)
            | ProcessingError::Io(_) => ErrorKind::Transport,
        }
    }
}
