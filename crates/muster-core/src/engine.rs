//! The synchronization engine: one instance per active team subscription.
//!
//! [`SyncEngine`] wires the pieces together and owns their lifecycle. A
//! `start()` spawns the coalescer worker and the feed supervisor (one
//! subscription per team/session; starting again tears the previous one
//! down first); `stop()` closes the subscription, cancels any pending
//! coalesced refresh, and bars late async results from writing into
//! disposed state. Event routing follows the two-path design: incident
//! events for the local team take the instant path, everything else
//! relevant schedules a debounced authoritative refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::cache::CacheStore;
use crate::coalesce::DebounceCoalescer;
use crate::config::EngineConfig;
use crate::feed::classify::{LocalContext, Relevance, classify};
use crate::feed::event::FeedEvent;
use crate::feed::subscriber::{
    FeedState, FeedSupervisor, FeedTransport, SupervisorConfig,
};
use crate::notify::{self, DispatchNotice};
use crate::patch::{self, IncidentPatch, PatchEffect};
use crate::reconcile::{Connectivity, IncidentSource, Reconciler, RefreshOutcome};
use crate::state::{EngineSnapshot, ListState};

/// Callback receiving qualifying dispatch notifications.
pub type DispatchCallback = Arc<dyn Fn(DispatchNotice) + Send + Sync>;

/// Callback observing every instant patch applied to the list.
pub type InstantUpdateCallback = Arc<dyn Fn(IncidentPatch) + Send + Sync>;

/// Host callbacks, all optional.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_new_dispatch: Option<DispatchCallback>,
    pub on_instant_update: Option<InstantUpdateCallback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_new_dispatch", &self.on_new_dispatch.is_some())
            .field("on_instant_update", &self.on_instant_update.is_some())
            .finish()
    }
}

/// External collaborators the engine consumes.
#[derive(Clone)]
pub struct EngineDeps {
    pub source: Arc<dyn IncidentSource>,
    pub cache: Arc<dyn CacheStore>,
    pub connectivity: Arc<dyn Connectivity>,
    pub transport: Arc<dyn FeedTransport>,
}

impl std::fmt::Debug for EngineDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineDeps").finish_non_exhaustive()
    }
}

/// Everything an installed feed handler needs, resolved per event from
/// live state rather than captured at install time.
struct EventContext {
    team_id: String,
    actor_id: Option<String>,
    state: Arc<ListState>,
    cache: Arc<dyn CacheStore>,
    connectivity: Arc<dyn Connectivity>,
    coalescer: Arc<DebounceCoalescer>,
    callbacks: Callbacks,
}

/// Real-time incident synchronization engine for one team.
pub struct SyncEngine {
    team_id: String,
    actor_id: Option<String>,
    config: EngineConfig,
    deps: EngineDeps,
    callbacks: Callbacks,
    state: Arc<ListState>,
    reconciler: Arc<Reconciler>,
    coalescer: Option<Arc<DebounceCoalescer>>,
    supervisor: Option<FeedSupervisor>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("team_id", &self.team_id)
            .field("started", &self.supervisor.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create a stopped engine for one team.
    #[must_use]
    pub fn new(
        team_id: impl Into<String>,
        actor_id: Option<String>,
        deps: EngineDeps,
        callbacks: Callbacks,
        config: EngineConfig,
    ) -> Self {
        let team_id = team_id.into();
        let state = Arc::new(ListState::new());
        let reconciler = Arc::new(Reconciler::new(
            team_id.clone(),
            Arc::clone(&deps.source),
            Arc::clone(&deps.cache),
            Arc::clone(&deps.connectivity),
            Arc::clone(&state),
        ));

        Self {
            team_id,
            actor_id,
            config,
            deps,
            callbacks,
            state,
            reconciler,
            coalescer: None,
            supervisor: None,
            shutdown: None,
        }
    }

    /// Spawn the coalescer worker and the feed subscription.
    ///
    /// Idempotent in effect: a running engine is torn down fully before
    /// the new subscription is created.
    pub fn start(&mut self) {
        if self.supervisor.is_some() {
            tracing::debug!(team_id = %self.team_id, "restarting engine; tearing down first");
            self.stop();
        }

        self.state.set_disposed(false);
        let shutdown = Arc::new(AtomicBool::new(false));

        let coalescer = {
            let reconciler = Arc::clone(&self.reconciler);
            Arc::new(DebounceCoalescer::new(
                self.config.coalesce_window(),
                move || {
                    reconciler.run();
                },
            ))
        };

        let context = Arc::new(EventContext {
            team_id: self.team_id.clone(),
            actor_id: self.actor_id.clone(),
            state: Arc::clone(&self.state),
            cache: Arc::clone(&self.deps.cache),
            connectivity: Arc::clone(&self.deps.connectivity),
            coalescer: Arc::clone(&coalescer),
            callbacks: self.callbacks.clone(),
        });
        let handler: Arc<dyn Fn(FeedEvent) + Send + Sync> =
            Arc::new(move |event| handle_event(&context, &event));

        let supervisor = FeedSupervisor::spawn(
            Arc::clone(&self.deps.transport),
            self.team_id.clone(),
            handler,
            SupervisorConfig {
                reconnect_delay: self.config.reconnect_delay(),
                poll_interval: self.config.poll_interval(),
            },
            Arc::clone(&shutdown),
        );

        self.coalescer = Some(coalescer);
        self.supervisor = Some(supervisor);
        self.shutdown = Some(shutdown);
        tracing::info!(team_id = %self.team_id, "sync engine started");
    }

    /// Tear down: close the subscription, cancel any pending coalesced
    /// refresh, and bar further state mutation.
    pub fn stop(&mut self) {
        self.state.set_disposed(true);
        if let Some(flag) = self.shutdown.take() {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(coalescer) = self.coalescer.take() {
            coalescer.shutdown();
        }
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.join();
        }
        tracing::info!(team_id = %self.team_id, "sync engine stopped");
    }

    /// Run a manual authoritative refresh now, outside the coalescer.
    pub fn refresh(&self) -> RefreshOutcome {
        self.reconciler.run()
    }

    /// Point-in-time view for the display layer.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.snapshot()
    }

    /// Current feed connection state.
    #[must_use]
    pub fn feed_state(&self) -> FeedState {
        self.supervisor
            .as_ref()
            .map_or(FeedState::Disconnected, FeedSupervisor::state)
    }

    /// The team this engine serves.
    #[must_use]
    pub fn team_id(&self) -> &str {
        &self.team_id
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_event(cx: &EventContext, event: &FeedEvent) {
    if cx.state.is_disposed() {
        return;
    }

    // The relevance set is re-derived from live state on every event.
    let tracked = cx.state.tracked_ids();
    let relevance = classify(
        event,
        &LocalContext {
            team_id: &cx.team_id,
            actor_id: cx.actor_id.as_deref(),
            tracked: &tracked,
        },
    );

    match relevance {
        Relevance::Irrelevant => {
            tracing::trace!(table = %event.table, "irrelevant feed event dropped");
        }
        Relevance::Assigned { ref incident_id } | Relevance::StillAssigned { ref incident_id } => {
            let newly_assigned = matches!(relevance, Relevance::Assigned { .. });
            emit_incident_notice(cx, event);
            apply_instant(cx, event, incident_id, newly_assigned);
        }
        Relevance::Unassigned { incident_id } => {
            tracing::debug!(%incident_id, "incident left team; scheduling refresh");
            cx.coalescer.trigger();
        }
        Relevance::ReportChanged { incident_id } => {
            if let Some(incident_id) = &incident_id {
                emit_report_notice(cx, event, incident_id);
            }
            schedule_if_online(cx, "field report change");
        }
        Relevance::Finalized { incident_id } => {
            tracing::debug!(%incident_id, "field report finalized; scheduling removal refresh");
            schedule_if_online(cx, "finalized report");
        }
    }
}

/// Instant path: merge or insert straight into memory, then mirror into
/// the cache without blocking.
fn apply_instant(cx: &EventContext, event: &FeedEvent, incident_id: &str, newly_assigned: bool) {
    let Some(new_row) = event.new.as_ref() else {
        return;
    };

    let patch = if newly_assigned {
        IncidentPatch::from_snapshot(new_row)
    } else {
        IncidentPatch::field_update(new_row)
    };
    let Some(patch) = patch else {
        tracing::debug!(incident_id, "instant event without usable snapshot; dropping");
        return;
    };

    let effect = cx.state.with_list(|list| patch::apply_patch(list, &patch));
    match effect {
        Some(PatchEffect::Merged | PatchEffect::Inserted) => {
            tracing::debug!(incident_id, ?effect, "instant patch applied");
            if let Some(callback) = &cx.callbacks.on_instant_update {
                callback(patch.clone());
            }
            // Fire-and-forget; failures stay inside the mirror thread.
            drop(patch::mirror_patch_to_cache(
                Arc::clone(&cx.cache),
                cx.team_id.clone(),
                patch,
            ));
        }
        Some(PatchEffect::Skipped) => {
            // Unknown id and too thin to insert: fall back to the
            // authoritative path so the record is not lost.
            cx.coalescer.trigger();
        }
        None => {}
    }
}

fn emit_incident_notice(cx: &EventContext, event: &FeedEvent) {
    let Some(kind) =
        notify::classify_incident_diff(event.old.as_ref(), event.new.as_ref(), &cx.team_id)
    else {
        return;
    };
    let Some(new_row) = event.new.as_ref() else {
        return;
    };
    if let Some(notice) =
        notify::incident_notice(event.old.as_ref(), new_row, kind, &cx.team_id, Utc::now())
    {
        dispatch(cx, notice);
    }
}

fn emit_report_notice(cx: &EventContext, event: &FeedEvent, incident_id: &str) {
    let Some(kind) =
        notify::classify_report_diff(event.event_type, event.old.as_ref(), event.new.as_ref())
    else {
        return;
    };
    let (Some(new_row), Some(incident)) = (event.new.as_ref(), cx.state.find(incident_id)) else {
        return;
    };
    if let Some(notice) = notify::report_notice(
        event.old.as_ref(),
        new_row,
        kind,
        &incident,
        &cx.team_id,
        Utc::now(),
    ) {
        dispatch(cx, notice);
    }
}

fn dispatch(cx: &EventContext, notice: DispatchNotice) {
    tracing::info!(
        notice_id = %notice.id,
        kind = %notice.kind.as_str(),
        incident_id = %notice.incident_id,
        "dispatch notification"
    );
    if let Some(callback) = &cx.callbacks.on_new_dispatch {
        callback(notice);
    }
}

fn schedule_if_online(cx: &EventContext, reason: &str) {
    if cx.connectivity.is_online() {
        cx.coalescer.trigger();
    } else {
        tracing::debug!(reason, "offline; refresh deferred to reconnect");
    }
}
