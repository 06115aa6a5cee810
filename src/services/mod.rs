mod subscriptions;
mod thumbnails;
mod upstream;

pub use subscriptions::{parse_tag_list, SubscriptionManager};
pub use thumbnails::{ThumbnailCache, ThumbnailDownloader, ThumbnailState, ThumbnailTicket, Thumbnails};
pub use upstream::{ChannelSource, HttpThumbnailSource, InvidiousClient, ThumbnailSource};
