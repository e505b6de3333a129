use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// An action was issued against a session that has already closed.
    #[error("session closed")]
    SessionClosed,
}
