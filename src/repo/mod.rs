//! Row types and upsert functions for the four persisted entities.

pub mod likes;
pub mod posts;
pub mod reposts;
pub mod users;

pub use likes::LikeRow;
pub use posts::PostRow;
pub use reposts::RepostRow;
pub use users::UserRow;
