use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("strategy {0} has no peer sink attached")]
    NotAttached(String),

    #[error("strategy {strategy} unavailable: {reason}")]
    Unavailable { strategy: String, reason: String },
}
