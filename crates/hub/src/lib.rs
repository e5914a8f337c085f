//! Live distribution hub: fans normalized telemetry out to viewer streams.

pub mod filter;
pub mod hub;
pub mod sink;
pub mod subscription;

pub use filter::SubscriberFilter;
pub use hub::{DistributionHub, SubscriberId};
pub use sink::{ChannelSink, DeliveryError, SubscriberSink};
pub use subscription::Subscription;
