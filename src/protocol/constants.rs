//! Tunnel wire protocol constants.

/// Device read buffer capacity; also the largest data frame payload.
pub const MAX_FRAME_PAYLOAD: usize = 2000;

/// Size of the big-endian length header preceding every frame.
pub const HEADER_SIZE: usize = 2;

/// Reserved length value marking a padding frame.
///
/// Sits far above [`MAX_FRAME_PAYLOAD`], so no valid data length can equal it.
pub const PADDING_SENTINEL: u16 = 65500;

/// Number of filler bytes following a padding header.
pub const PADDING_PAYLOAD_LEN: usize = 1000;

/// Filler byte used for padding payloads.
pub const PADDING_FILL_BYTE: u8 = b'F';

/// Total on-wire size of a padding frame.
pub const PADDING_FRAME_LEN: usize = HEADER_SIZE + PADDING_PAYLOAD_LEN;
