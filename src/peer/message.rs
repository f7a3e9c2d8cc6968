use crate::error::{FetchError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest frame we are willing to buffer. Anything bigger is treated as a
/// malformed length prefix.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Location of a block within a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Chunk index
    pub piece_index: u32,
    /// Byte offset within the chunk
    pub offset: u32,
    /// Length of the block
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(self.piece_index);
        buf.put_u32(self.offset);
        buf.put_u32(self.length);
    }

    fn parse(mut payload: Bytes, kind: &str) -> Result<Self> {
        if payload.len() != 12 {
            return Err(FetchError::ProtocolViolation(format!(
                "{} payload must be 12 bytes, got {}",
                kind,
                payload.len()
            )));
        }
        Ok(Self::new(payload.get_u32(), payload.get_u32(), payload.get_u32()))
    }
}

/// Kind byte carried by every non keep-alive frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(id: u8) -> std::result::Result<Self, u8> {
        Ok(match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => return Err(other),
        })
    }
}

/// Messages exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Zero-length frame. Carries no kind and no meaning.
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Bytes },
    Request { block: BlockInfo },
    Piece {
        piece_index: u32,
        offset: u32,
        data: Bytes,
    },
    Cancel { block: BlockInfo },
    /// A well-framed message whose kind byte we do not speak.
    Unknown { id: u8, payload: Bytes },
}

/// Frame `payload` behind a length prefix and kind byte.
/// Format: <length = payload + 1><kind><payload>
pub fn encode_frame(id: MessageId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u32(payload.len() as u32 + 1);
    buf.put_u8(id as u8);
    buf.put_slice(payload);
    buf.freeze()
}

impl PeerMessage {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut payload = BytesMut::new();
        let id = match self {
            PeerMessage::KeepAlive => return Bytes::from_static(&[0, 0, 0, 0]),
            PeerMessage::Choke => MessageId::Choke,
            PeerMessage::Unchoke => MessageId::Unchoke,
            PeerMessage::Interested => MessageId::Interested,
            PeerMessage::NotInterested => MessageId::NotInterested,
            PeerMessage::Have { piece_index } => {
                payload.put_u32(*piece_index);
                MessageId::Have
            }
            PeerMessage::Bitfield { bitfield } => {
                payload.put_slice(bitfield);
                MessageId::Bitfield
            }
            PeerMessage::Request { block } => {
                block.put(&mut payload);
                MessageId::Request
            }
            PeerMessage::Piece {
                piece_index,
                offset,
                data,
            } => {
                payload.put_u32(*piece_index);
                payload.put_u32(*offset);
                payload.put_slice(data);
                MessageId::Piece
            }
            PeerMessage::Cancel { block } => {
                block.put(&mut payload);
                MessageId::Cancel
            }
            PeerMessage::Unknown { id, payload: raw } => {
                let mut buf = BytesMut::with_capacity(5 + raw.len());
                buf.put_u32(raw.len() as u32 + 1);
                buf.put_u8(*id);
                buf.put_slice(raw);
                return buf.freeze();
            }
        };
        encode_frame(id, &payload)
    }

    /// Interpret the body of a non-empty frame: first byte kind, rest payload.
    pub fn from_frame(mut frame: Bytes) -> Result<Self> {
        if frame.is_empty() {
            return Ok(PeerMessage::KeepAlive);
        }
        let raw_id = frame.get_u8();
        let mut payload = frame;

        let id = match MessageId::try_from(raw_id) {
            Ok(id) => id,
            Err(id) => return Ok(PeerMessage::Unknown { id, payload }),
        };

        let expect_empty = |payload: &Bytes, message: PeerMessage| {
            if payload.is_empty() {
                Ok(message)
            } else {
                Err(FetchError::ProtocolViolation(format!(
                    "{:?} carries an unexpected {} byte payload",
                    id,
                    payload.len()
                )))
            }
        };

        match id {
            MessageId::Choke => expect_empty(&payload, PeerMessage::Choke),
            MessageId::Unchoke => expect_empty(&payload, PeerMessage::Unchoke),
            MessageId::Interested => expect_empty(&payload, PeerMessage::Interested),
            MessageId::NotInterested => expect_empty(&payload, PeerMessage::NotInterested),
            MessageId::Have => {
                if payload.len() != 4 {
                    return Err(FetchError::ProtocolViolation(format!(
                        "have payload must be 4 bytes, got {}",
                        payload.len()
                    )));
                }
                Ok(PeerMessage::Have {
                    piece_index: payload.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(PeerMessage::Bitfield { bitfield: payload }),
            MessageId::Request => Ok(PeerMessage::Request {
                block: BlockInfo::parse(payload, "request")?,
            }),
            MessageId::Piece => {
                if payload.len() < 8 {
                    return Err(FetchError::ProtocolViolation(format!(
                        "piece payload too short: {} bytes",
                        payload.len()
                    )));
                }
                let piece_index = payload.get_u32();
                let offset = payload.get_u32();
                Ok(PeerMessage::Piece {
                    piece_index,
                    offset,
                    data: payload,
                })
            }
            MessageId::Cancel => Ok(PeerMessage::Cancel {
                block: BlockInfo::parse(payload, "cancel")?,
            }),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::KeepAlive => "keep-alive",
            PeerMessage::Choke => "choke",
            PeerMessage::Unchoke => "unchoke",
            PeerMessage::Interested => "interested",
            PeerMessage::NotInterested => "not-interested",
            PeerMessage::Have { .. } => "have",
            PeerMessage::Bitfield { .. } => "bitfield",
            PeerMessage::Request { .. } => "request",
            PeerMessage::Piece { .. } => "piece",
            PeerMessage::Cancel { .. } => "cancel",
            PeerMessage::Unknown { .. } => "unknown",
        }
    }
}

/// Fill `buf` completely or report how far we got before the peer hung up.
pub(crate) async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(FetchError::ShortRead {
                expected: buf.len(),
                got: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Read exactly one frame from `reader`.
///
/// A zero length prefix yields [`PeerMessage::KeepAlive`]. The frame is either
/// consumed whole or the call fails.
pub async fn read_message<R>(reader: &mut R) -> Result<PeerMessage>
where
    R: AsyncRead + Unpin,
{
    let mut length_buf = [0u8; 4];
    read_full(reader, &mut length_buf).await?;
    let length = u32::from_be_bytes(length_buf) as usize;

    if length == 0 {
        return Ok(PeerMessage::KeepAlive);
    }
    if length > MAX_FRAME_LEN {
        return Err(FetchError::ProtocolViolation(format!(
            "frame length {} exceeds limit",
            length
        )));
    }

    let mut frame = vec![0u8; length];
    read_full(reader, &mut frame).await?;
    PeerMessage::from_frame(Bytes::from(frame))
}
