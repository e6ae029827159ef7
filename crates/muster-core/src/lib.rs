//! muster-core: real-time assigned-incident synchronization.
//!
//! The engine keeps a field-responder client's view of "incidents
//! currently assigned to my team" consistent with a central store under
//! intermittent connectivity and bursty change traffic. A live change feed
//! is classified per event: high-value incident changes apply instantly to
//! local state, everything else relevant collapses through a debounce
//! window into bounded-rate authoritative refreshes, and a durable cache
//! carries the list across offline stretches. Field-level diffs project
//! into dispatch notifications with noise suppression.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums at the library surface; the cache is
//!   advisory and its failures never propagate.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`,
//!   `trace!`); subscriber setup belongs to the host binary.

pub mod backend;
pub mod cache;
pub mod coalesce;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod model;
pub mod notify;
pub mod patch;
pub mod reconcile;
pub mod state;

pub use backend::QueryResponse;
pub use cache::{CacheStore, MemoryCacheStore, SqliteCacheStore};
pub use coalesce::DebounceCoalescer;
pub use config::EngineConfig;
pub use engine::{Callbacks, EngineDeps, SyncEngine};
pub use error::{FetchError, SyncError};
pub use feed::{FeedEvent, FeedEventType, FeedState, FeedSubscription, FeedTransport, RecordTable};
pub use model::{FieldReport, Incident};
pub use notify::{DispatchKind, DispatchNotice};
pub use patch::IncidentPatch;
pub use reconcile::{Connectivity, IncidentSource, OnlineFlag, RefreshOutcome};
pub use state::EngineSnapshot;
