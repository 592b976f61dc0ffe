//! Tunnel frame codec.
//!
//! Every unit written to the transport stream is one of two frames.
//!
//! ## Wire Format
//!
//! Data frame:
//! ```text
//! [len:u16 BE] [payload: len bytes]          len <= 2000
//! ```
//!
//! Padding frame:
//! ```text
//! [65500:u16 BE] [filler: 1000 bytes]
//! ```
//!
//! The sentinel is compared exactly before the field is ever read as a length.
//! Data lengths are capped at [`MAX_FRAME_PAYLOAD`], so a data frame can never
//! be mistaken for padding.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::error::{Error, Result};

/// Decoded 2-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// A data frame carrying this many payload bytes.
    Data(usize),
    /// A padding frame; [`PADDING_PAYLOAD_LEN`] filler bytes follow.
    Padding,
}

impl FrameHeader {
    /// Interpret a big-endian length field.
    #[inline]
    pub fn decode(raw: [u8; HEADER_SIZE]) -> Self {
        let value = u16::from_be_bytes(raw);
        if value == PADDING_SENTINEL {
            Self::Padding
        } else {
            Self::Data(value as usize)
        }
    }

    /// Encode back into the on-wire length field.
    ///
    /// Fails for data lengths that do not fit the protocol.
    pub fn encode(self) -> Result<[u8; HEADER_SIZE]> {
        match self {
            Self::Padding => Ok(PADDING_SENTINEL.to_be_bytes()),
            Self::Data(len) => {
                check_payload_len(len)?;
                Ok((len as u16).to_be_bytes())
            }
        }
    }

    /// Number of bytes that follow this header on the wire.
    #[inline]
    pub fn body_len(self) -> usize {
        match self {
            Self::Data(len) => len,
            Self::Padding => PADDING_PAYLOAD_LEN,
        }
    }

    /// Reject data lengths larger than the device buffer.
    pub fn validate(self) -> Result<Self> {
        if let Self::Data(len) = self {
            check_payload_len(len)?;
        }
        Ok(self)
    }

    /// Check if this is a padding header.
    #[inline]
    pub fn is_padding(self) -> bool {
        matches!(self, Self::Padding)
    }
}

/// A complete frame decoded from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opaque IP packet (TUN) or link-layer frame (TAP).
    Data(Bytes),
    /// Filler; contents are not validated.
    Padding,
}

impl Frame {
    /// Decode one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed, or `None` if `buf`
    /// does not yet hold a complete frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = FrameHeader::decode([buf[0], buf[1]]).validate()?;
        let total = HEADER_SIZE + header.body_len();
        if buf.len() < total {
            return Ok(None);
        }

        let frame = match header {
            FrameHeader::Padding => Self::Padding,
            FrameHeader::Data(_) => Self::Data(Bytes::copy_from_slice(&buf[HEADER_SIZE..total])),
        };
        Ok(Some((frame, total)))
    }

    /// Encode this frame into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Self::Data(payload) => encode_data(payload),
            Self::Padding => Ok(encode_padding()),
        }
    }
}

#[inline]
fn check_payload_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_PAYLOAD {
        return Err(Error::OversizeFrame {
            len,
            max: MAX_FRAME_PAYLOAD,
        });
    }
    Ok(())
}

/// Encode a data frame: length header followed by the payload.
pub fn encode_data(payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_data_into(payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a data frame into a reusable buffer.
///
/// `dst` is cleared first. Nothing is written when the payload is too large.
pub fn encode_data_into(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = FrameHeader::Data(payload.len()).encode()?;
    dst.clear();
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&header);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a padding frame: sentinel header followed by filler.
pub fn encode_padding() -> Bytes {
    let mut buf = BytesMut::with_capacity(PADDING_FRAME_LEN);
    buf.put_u16(PADDING_SENTINEL);
    buf.put_bytes(PADDING_FILL_BYTE, PADDING_PAYLOAD_LEN);
    buf.freeze()
}
