//! Error taxonomy for the pipeline and its storage collaborator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The page did not load or settle within the navigation timeout.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A required field was empty after every selector candidate was tried.
    #[error("extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("search for {query:?} failed: {reason}")]
    Search { query: String, reason: String },

    /// The generation call failed on every attempt.
    #[error("generation failed after {attempts} attempt(s): {reason}")]
    Generation { attempts: usize, reason: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StorageError::Decode(err.to_string())
        } else {
            StorageError::Network(err.to_string())
        }
    }
}

impl From<chromiumoxide::error::CdpError> for PipelineError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PipelineError::Browser(err.to_string())
    }
}
