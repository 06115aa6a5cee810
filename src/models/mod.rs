mod channel;
mod video;

pub use channel::{Channel, TagGroup, TaggedChannel};
pub use video::{NewVideo, UpstreamVideo, VideoEntry};
