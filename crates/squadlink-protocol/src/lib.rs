//! Squadlink Protocol -- wire types, request decoding, frame codec.
//!
//! Stream transport: 4-byte big-endian length prefix + serde JSON.
//! Socket transport: one JSON envelope per text frame.
//! Both carry the same `Envelope` inbound and `ServerMessage` outbound.

pub mod codec;
pub mod messages;
pub mod request;

pub use codec::{ClientCodec, JsonFrameCodec, StreamCodec, MAX_FRAME_SIZE};
pub use messages::*;
pub use request::{ListFilter, Request};

/// Peer identifier (opaque string chosen by the client).
pub type PeerId = String;

/// Squad identifier (opaque string chosen by the creator).
pub type SquadId = String;

/// Default page size for store listings.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("no field {0} in payload")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
