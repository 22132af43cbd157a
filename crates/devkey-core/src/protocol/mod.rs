//! Protocol module containing the IPC message types and the frame codec.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_message, encode_message, ProtocolError};
pub use messages::*;
pub use sequence::SequenceCounter;
