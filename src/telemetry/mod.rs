pub mod api;
pub mod channel;
pub mod poller;
pub mod types;

pub use api::{AnalyticsClient, RealtimeSource};
pub use channel::{ChannelEnd, ChannelStats};
pub use poller::{AnalyticsPoller, PollerSettings};
