use squadlink_crypto::CryptoError;
use squadlink_protocol::{PeerId, ProtocolError, SquadId};
use squadlink_storage::StoreError;

/// Coarse classification used for HTTP status codes and log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    AlreadyExists,
    Unauthorized,
    Conflict,
    TransportFailure,
    Unavailable,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("peer {0} not found")]
    PeerNotFound(PeerId),
    #[error("squad {0} not found")]
    SquadNotFound(SquadId),
    #[error("squad {0} already exists")]
    IdCollision(SquadId),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("peer {peer} is not the owner of squad {squad}")]
    NotOwner { squad: SquadId, peer: PeerId },
    #[error("access denied: wrong password")]
    AccessDenied,
    #[error("not a valid token provided")]
    InvalidToken,
    #[error("peer {0} is already authenticating")]
    AlreadyPending(PeerId),
    #[error("peer {0} has not initiated auth")]
    NoPendingChallenge(PeerId),
    #[error("authentication failed: wrong key")]
    AuthMismatch,
    #[error("{0} requires a live session")]
    SessionRequired(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::PeerNotFound(_) | HubError::SquadNotFound(_) => ErrorKind::NotFound,
            HubError::IdCollision(_) | HubError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            HubError::NotOwner { .. }
            | HubError::AccessDenied
            | HubError::InvalidToken
            | HubError::AuthMismatch => ErrorKind::Unauthorized,
            HubError::AlreadyPending(_) | HubError::NoPendingChallenge(_) => ErrorKind::Conflict,
            HubError::SessionRequired(_) | HubError::Protocol(_) => ErrorKind::BadRequest,
            HubError::Crypto(CryptoError::InvalidKey(_)) => ErrorKind::BadRequest,
            HubError::Store(StoreError::Pattern(_)) => ErrorKind::BadRequest,
            HubError::Transport(_) => ErrorKind::TransportFailure,
            HubError::Cancelled => ErrorKind::Unavailable,
            HubError::Store(_) | HubError::Crypto(_) | HubError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for HubError {
    fn from(e: tokio::task::JoinError) -> Self {
        HubError::Internal(e.to_string())
    }
}
