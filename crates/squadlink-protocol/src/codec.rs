//! Stream transport framing: each frame is a u32 big-endian body length
//! followed by that many bytes of JSON.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{Envelope, ServerMessage};
use crate::ProtocolError;

/// Largest accepted frame body, in bytes.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Codec decoding `D` frames and encoding `E` frames over a byte stream.
pub struct JsonFrameCodec<D, E> {
    _types: PhantomData<fn() -> (D, E)>,
}

/// Hub side of the stream transport.
pub type StreamCodec = JsonFrameCodec<Envelope, ServerMessage>;

/// Client side of the stream transport.
pub type ClientCodec = JsonFrameCodec<ServerMessage, Envelope>;

impl<D, E> JsonFrameCodec<D, E> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<D, E> Default for JsonFrameCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> Decoder for JsonFrameCodec<D, E> {
    type Item = D;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, ProtocolError> {
        let Some(prefix) = src.get(..PREFIX_LEN) else {
            return Ok(None);
        };
        let frame_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        check_size(frame_len)?;

        let needed = PREFIX_LEN + frame_len;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        let frame = src.split_to(needed).freeze();
        Ok(Some(serde_json::from_slice(&frame[PREFIX_LEN..])?))
    }
}

impl<D, E: Serialize> Encoder<E> for JsonFrameCodec<D, E> {
    type Error = ProtocolError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body = serde_json::to_vec(&item)?;
        check_size(body.len())?;

        dst.reserve(PREFIX_LEN + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

fn check_size(size: usize) -> Result<(), ProtocolError> {
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}
