//! Wire-format decoding and pure classification for the firehose commit
//! stream. This crate knows nothing about sockets, channels, or Postgres —
//! it turns raw frame bytes into [`frame::CommitBody`] values and flattens
//! record payloads into the shapes the persistence layer stores, and
//! nothing else.

pub mod frame;
pub mod records;
pub mod value;

pub use frame::{Block, CommitBody, DecodeError, FrameHeader, RepoOp};
pub use records::{ActivityKind, ClassifiedOp, EmbedInfo, ReplyInfo};
pub use value::Node;
