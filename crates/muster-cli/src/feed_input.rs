//! Feed inputs for the CLI host: scripted NDJSON replays and the inert
//! transport used by one-shot commands that never subscribe.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use muster_core::feed::subscriber::{FeedError, FeedSubscription, FeedTransport};
use muster_core::feed::FeedEvent;

/// Parse an NDJSON file of feed events, one JSON object per line.
/// Blank lines and `#` comment lines are skipped.
pub fn read_events(path: &Path) -> Result<Vec<FeedEvent>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: FeedEvent = serde_json::from_str(line)
            .with_context(|| format!("Bad event at {}:{}", path.display(), index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Transport that serves one preloaded script, pacing events by a fixed
/// gap, then stays connected until the engine shuts down.
pub struct ReplayTransport {
    script: Mutex<Option<Vec<FeedEvent>>>,
    event_gap: Duration,
    // Keeps the channel open after the script drains so the supervisor
    // does not treat end-of-script as transport loss.
    holders: Mutex<Vec<Sender<FeedEvent>>>,
}

impl ReplayTransport {
    #[must_use]
    pub fn new(script: Vec<FeedEvent>, event_gap: Duration) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            event_gap,
            holders: Mutex::new(Vec::new()),
        }
    }
}

impl FeedTransport for ReplayTransport {
    fn subscribe(&self, _team_id: &str) -> Result<FeedSubscription, FeedError> {
        let script = self
            .script
            .lock()
            .map_err(|_| FeedError::Subscribe("replay script lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| FeedError::Subscribe("replay script already consumed".to_string()))?;

        let (tx, subscription) = FeedSubscription::channel();
        if let Ok(mut holders) = self.holders.lock() {
            holders.push(tx.clone());
        }

        let gap = self.event_gap;
        let spawned = thread::Builder::new()
            .name("muster-replay-feed".to_string())
            .spawn(move || {
                for event in script {
                    if tx.send(event).is_err() {
                        return;
                    }
                    if !gap.is_zero() {
                        thread::sleep(gap);
                    }
                }
            });
        if let Err(e) = spawned {
            return Err(FeedError::Subscribe(format!("spawn replay thread: {e}")));
        }

        Ok(subscription)
    }
}

/// Transport for commands that never start the feed.
#[derive(Debug, Default)]
pub struct NullTransport;

impl FeedTransport for NullTransport {
    fn subscribe(&self, _team_id: &str) -> Result<FeedSubscription, FeedError> {
        Err(FeedError::Subscribe("no feed configured".to_string()))
    }
}
