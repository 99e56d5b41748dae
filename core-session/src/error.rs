use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The external issuing mechanism has no usable browser environment on
    /// this host. Distinct so callers can show an actionable message.
    #[error("Credential issuing environment unavailable: {0}")]
    IssuerUnavailable(String),

    #[error("Credential issuance failed: {0}")]
    IssueFailed(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
