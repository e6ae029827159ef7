//! Change-feed consumption: wire types, relevance classification, and the
//! supervised long-lived subscription.

pub mod classify;
pub mod event;
pub mod subscriber;

pub use classify::{LocalContext, Relevance, classify};
pub use event::{FeedEvent, FeedEventType, RecordTable};
pub use subscriber::{
    FeedError, FeedState, FeedSubscription, FeedSupervisor, FeedTransport, SupervisorConfig,
};
