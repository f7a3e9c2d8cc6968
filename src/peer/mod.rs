mod bitfield;
pub mod dialer;
mod message;
mod protocol;
mod session;

pub use bitfield::Bitfield;
pub use message::{encode_frame, read_message, BlockInfo, MessageId, PeerMessage, MAX_FRAME_LEN};
pub use protocol::{handshake, Handshake, HANDSHAKE_LEN, PROTOCOL_STRING};
pub use session::{Liveness, PeerSession, SessionState, MAX_SKIPPED_FRAMES};
