//! Error taxonomy for the ingestion engine.
//!
//! One variant per failure class. Per-value parse failures inside a table are
//! not errors at all; they degrade to missing fields in the transform layer.
//! `Parsing` means the downloaded file could not be loaded as a table.

/// All errors surfaced by the engine's public operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("source not found: {0}")]
    NotFound(String),

    #[error("run already in flight for source: {0}")]
    AlreadyRunning(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("interaction timed out: {0}")]
    InteractionTimeout(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("file could not be read as a table: {0}")]
    Parsing(String),

    #[error("record load failed: {0}")]
    Load(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short machine-readable tag for status rows and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::AlreadyRunning(_) => "already_running",
            Self::Navigation(_) => "navigation",
            Self::InteractionTimeout(_) => "interaction_timeout",
            Self::Extraction(_) => "extraction",
            Self::Parsing(_) => "parsing",
            Self::Load(_) => "load",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
        }
    }
}
