mod import;
mod poller;
pub mod relative_time;

pub use import::{parse_subscription_file, parse_subscriptions, ImportFormat};
pub use poller::{resolve_listing, PollSummary, Poller, FRESHNESS_WINDOW_SECS};
