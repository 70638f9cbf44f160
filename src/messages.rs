//! Request types carried on the two inter-stage queues.

use crate::repo::{LikeRow, PostRow, RepostRow};

/// A raw frame handed from the supervisor to a processing worker. Decoding
/// happens downstream so that the supervisor's receive loop never blocks on
/// CPU-bound work.
pub type RawFrame = Vec<u8>;

/// A tagged request on the persistence queue. `Shutdown` is the explicit
/// sentinel — one is enqueued per persistence worker at shutdown, since
/// workers drain the queue rather than watch a cancellation token.
pub enum PersistRequest {
    InsertUser(String),
    InsertPost(Box<PostRow>),
    InsertRepost(Box<RepostRow>),
    InsertLike(Box<LikeRow>),
    Shutdown,
}
