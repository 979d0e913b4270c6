use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RetrieveError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing required setting: {0}")]
    #[diagnostic(help("set it in meta-retrieve.json, the environment or on the command line"))]
    MissingSetting(&'static str),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned status {status}: {message}")]
    TransportStatus { status: u16, message: String },

    #[error("failed to decode retrieve plan: {0}")]
    PlanDecode(String),

    #[error("invalid archive: {0}")]
    ArchiveOpen(String),

    #[error("failed to merge JSON: {0}")]
    Merge(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to write archive: {0}")]
    ArchiveWrite(String),
}
