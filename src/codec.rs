//! Length-prefixed frame codec for data channel connections.
//!
//! Every frame on the wire is a 4-byte unsigned length followed by exactly
//! that many payload bytes:
//!
//! ```text
//! ┌──────────────┬─────────────────────────┐
//! │ length (u32) │ payload (length bytes)  │
//! └──────────────┴─────────────────────────┘
//! ```
//!
//! The byte order of the length is [`WIRE_BYTE_ORDER`] unless a codec is
//! built with [`FrameCodec::with_byte_order`]. There is no resynchronization:
//! a short read or rejected length ends the connection.
//!
//! ```rust
//! use bytes::BytesMut;
//! use groundgate::codec::FrameCodec;
//! use tokio_util::codec::Decoder;
//!
//! let codec = FrameCodec::new();
//! let wire = codec.encode_to_vec(b"hello").unwrap();
//! assert_eq!(&wire[..4], &[5, 0, 0, 0]);
//!
//! let mut buf = BytesMut::from(&wire[..]);
//! let frame = FrameCodec::new().decode(&mut buf).unwrap().unwrap();
//! assert_eq!(&frame[..], b"hello");
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::{GatewayError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Byte order of the length prefix used by ground equipment.
pub const WIRE_BYTE_ORDER: ByteOrder = ByteOrder::LittleEndian;

// Upper bound on speculative buffer growth for a single announced frame.
const MAX_RESERVE: usize = 64 * 1024;

/// Byte order of the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn encode_len(self, len: u32) -> [u8; LENGTH_PREFIX_LEN] {
        match self {
            ByteOrder::LittleEndian => len.to_le_bytes(),
            ByteOrder::BigEndian => len.to_be_bytes(),
        }
    }

    pub fn decode_len(self, prefix: [u8; LENGTH_PREFIX_LEN]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(prefix),
            ByteOrder::BigEndian => u32::from_be_bytes(prefix),
        }
    }
}

/// Encoder/decoder for length-prefixed frames.
///
/// Usable with `tokio_util::codec::{FramedRead, FramedWrite}` or directly on
/// any async reader/writer through [`FrameCodec::read_frame`] and
/// [`FrameCodec::write_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    byte_order: ByteOrder,
    max_frame_len: Option<usize>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Codec using [`WIRE_BYTE_ORDER`] and no frame size limit.
    pub fn new() -> Self {
        Self {
            byte_order: WIRE_BYTE_ORDER,
            max_frame_len: None,
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Reject frames whose payload exceeds `max` bytes.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = Some(max);
        self
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn max_frame_len(&self) -> Option<usize> {
        self.max_frame_len
    }

    /// Encode one payload into its wire representation.
    pub fn encode_to_vec(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let len = self.check_len(payload.len())?;
        let mut wire = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        wire.extend_from_slice(&self.byte_order.encode_len(len));
        wire.extend_from_slice(payload);
        Ok(wire)
    }

    /// Read exactly one frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly before the
    /// first length byte. Any other short read is a framing error.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<Bytes>>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_LEN {
            let n = reader.read(&mut prefix[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(GatewayError::framing(format!(
                    "stream closed after {filled} of {LENGTH_PREFIX_LEN} length bytes"
                )));
            }
            filled += n;
        }

        let len = self.byte_order.decode_len(prefix) as usize;
        self.check_len(len)?;

        let mut payload = Vec::with_capacity(len.min(MAX_RESERVE));
        let read = (&mut *reader).take(len as u64).read_to_end(&mut payload).await?;
        if read < len {
            return Err(GatewayError::framing(format!(
                "stream closed after {read} of {len} payload bytes"
            )));
        }
        Ok(Some(Bytes::from(payload)))
    }

    /// Write one frame and flush it.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let len = self.check_len(payload.len())?;
        writer.write_all(&self.byte_order.encode_len(len)).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<u32> {
        if let Some(max) = self.max_frame_len {
            if len > max {
                return Err(GatewayError::framing(format!(
                    "frame of {len} bytes exceeds limit of {max}"
                )));
            }
        }
        u32::try_from(len).map_err(|_| {
            GatewayError::framing(format!("frame of {len} bytes does not fit a u32 length"))
        })
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let len = self.byte_order.decode_len(prefix) as usize;
        self.check_len(len)?;

        let needed = LENGTH_PREFIX_LEN + len;
        if src.len() < needed {
            src.reserve((needed - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(GatewayError::framing(format!(
                "connection closed with {} bytes of an incomplete frame",
                buf.len()
            ))),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        let len = self.check_len(item.len())?;
        dst.reserve(LENGTH_PREFIX_LEN + item.len());
        dst.put_slice(&self.byte_order.encode_len(len));
        dst.put_slice(&item);
        Ok(())
    }
}
