//! Long-lived change-feed subscription and its supervisor.
//!
//! The supervisor owns one background thread per engine session. It walks
//! the `Disconnected -> Connecting -> Subscribed` state machine, pumps
//! events into the engine's handler, and on transport loss parks in
//! `Reconnecting` for a fixed delay before trying again. There is no
//! backoff growth: the source system retries at a fixed interval
//! indefinitely, and that behavior is kept.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::event::FeedEvent;

/// Connection lifecycle of the feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    Reconnecting,
}

impl FeedState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Subscribed => 2,
            Self::Reconnecting => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Subscribed,
            3 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free view of the supervisor's current state.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(FeedState::Disconnected.as_u8()))
    }

    fn set(&self, state: FeedState) {
        self.0.store(state.as_u8(), Ordering::Relaxed);
    }

    fn get(&self) -> FeedState {
        FeedState::from_u8(self.0.load(Ordering::Relaxed))
    }
}

/// Feed transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("feed subscribe failed: {0}")]
    Subscribe(String),
    #[error("feed transport closed: {0}")]
    Transport(String),
}

/// A live subscription: a stream of decoded feed events.
///
/// The subscription ends when every paired sender is dropped, which the
/// supervisor treats as transport loss.
#[derive(Debug)]
pub struct FeedSubscription {
    receiver: Receiver<FeedEvent>,
}

impl FeedSubscription {
    /// Build a subscription plus the sender side a transport pushes into.
    #[must_use]
    pub fn channel() -> (Sender<FeedEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { receiver: rx })
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<FeedEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// A source of feed subscriptions. One subscription exists per
/// (team, session); the supervisor re-calls this after transport loss.
pub trait FeedTransport: Send + Sync {
    /// Open a live subscription for the given team's record families.
    ///
    /// # Errors
    ///
    /// [`FeedError::Subscribe`] when the transport cannot connect; the
    /// supervisor will retry after the reconnect delay.
    fn subscribe(&self, team_id: &str) -> Result<FeedSubscription, FeedError>;
}

/// Timing knobs for the supervisor loop.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Fixed delay between a transport loss and the next connect attempt.
    pub reconnect_delay: Duration,
    /// Granularity of shutdown checks while waiting for events or delays.
    pub poll_interval: Duration,
}

/// Owns the subscription thread for one engine session.
#[derive(Debug)]
pub struct FeedSupervisor {
    handle: Option<JoinHandle<()>>,
    state: Arc<StateCell>,
}

impl FeedSupervisor {
    /// Spawn the supervisor thread.
    ///
    /// `shutdown` is shared with the owning engine; once it flips, the
    /// thread releases its subscription and exits with the state machine
    /// parked at `Disconnected`.
    pub fn spawn(
        transport: Arc<dyn FeedTransport>,
        team_id: String,
        handler: Arc<dyn Fn(FeedEvent) + Send + Sync>,
        config: SupervisorConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let state = Arc::new(StateCell::new());
        let thread_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name(format!("muster-feed-{team_id}"))
            .spawn(move || {
                run_supervisor(&transport, &team_id, &handler, config, &shutdown, &thread_state);
            })
            .ok();

        if handle.is_none() {
            tracing::error!("failed to spawn feed supervisor thread");
        }

        Self { handle, state }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> FeedState {
        self.state.get()
    }

    /// Wait for the supervisor thread to exit. The owner must have flipped
    /// the shared shutdown flag first.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("feed supervisor thread panicked");
            }
        }
    }
}

fn run_supervisor(
    transport: &Arc<dyn FeedTransport>,
    team_id: &str,
    handler: &Arc<dyn Fn(FeedEvent) + Send + Sync>,
    config: SupervisorConfig,
    shutdown: &AtomicBool,
    state: &StateCell,
) {
    while !shutdown.load(Ordering::Relaxed) {
        state.set(FeedState::Connecting);

        match transport.subscribe(team_id) {
            Ok(subscription) => {
                state.set(FeedState::Subscribed);
                tracing::info!(team_id, "feed subscription established");

                if pump_events(&subscription, handler, config, shutdown) {
                    break;
                }
                tracing::warn!(team_id, "feed transport lost; scheduling reconnect");
            }
            Err(e) => {
                tracing::warn!(team_id, error = %e, "feed subscribe failed; scheduling reconnect");
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        state.set(FeedState::Reconnecting);
        sleep_interruptibly(config.reconnect_delay, config.poll_interval, shutdown);
    }

    state.set(FeedState::Disconnected);
    tracing::debug!(team_id, "feed supervisor stopped");
}

/// Pump events until shutdown (returns true) or transport loss (false).
fn pump_events(
    subscription: &FeedSubscription,
    handler: &Arc<dyn Fn(FeedEvent) + Send + Sync>,
    config: SupervisorConfig,
    shutdown: &AtomicBool,
) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return true;
        }
        match subscription.recv_timeout(config.poll_interval) {
            Ok(event) => handler(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn sleep_interruptibly(total: Duration, slice: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(slice.min(deadline.saturating_duration_since(Instant::now())));
    }
}
