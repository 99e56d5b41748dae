use core_session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Item has no catalog identifier")]
    MissingCatalogId,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid queue entry state: {0}")]
    InvalidEntryState(String),

    #[error("Invalid queue entry transition from {from} to {to}")]
    InvalidEntryTransition { from: String, to: String },

    #[error("Ledger entry {0} not found")]
    EntryNotFound(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
