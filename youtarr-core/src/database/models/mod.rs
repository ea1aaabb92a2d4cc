//! Database row models.

pub mod channel;
pub mod video;

pub use channel::ChannelDbModel;
pub use video::{VideoDbModel, VideoFileUpdate};
