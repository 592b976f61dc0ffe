//! Tunnel wire protocol.
//!
//! This module contains:
//! - Constants: frame sizes and the padding sentinel
//! - Frame: length-prefixed data and padding frame codec

mod constants;
mod frame;

pub use constants::*;
pub use frame::{encode_data, encode_data_into, encode_padding, Frame, FrameHeader};
