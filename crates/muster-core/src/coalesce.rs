//! Trailing-edge debounce for authoritative refreshes.
//!
//! Feed bursts arrive far faster than a full reconciliation should run.
//! [`DebounceCoalescer`] bounds the rate: a trigger landing outside the
//! coalescing window runs the action immediately; triggers inside the
//! window collapse into exactly one deferred run scheduled for
//! `last_run + window`. For any finite burst the action runs exactly once,
//! no earlier than the first trigger and no later than the last trigger
//! plus one window.
//!
//! # Thread model
//!
//! One dedicated worker thread sleeps on a [`Condvar`] until a deadline is
//! pending, then waits out the deadline with [`Condvar::wait_timeout`].
//! Immediate runs execute on the triggering thread itself. `shutdown()`
//! cancels any pending run and joins the worker, so the action can never
//! fire against disposed state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Counters describing how triggers were absorbed.
#[derive(Debug, Default)]
pub struct CoalesceMetrics {
    /// Triggers that ran the action immediately (window was open).
    pub immediate_runs: AtomicU64,
    /// Triggers that scheduled or re-armed a deferred run.
    pub deferred_triggers: AtomicU64,
    /// Deferred runs actually executed by the worker.
    pub deferred_runs: AtomicU64,
}

impl CoalesceMetrics {
    /// Total action executions so far.
    #[must_use]
    pub fn total_runs(&self) -> u64 {
        self.immediate_runs.load(Ordering::Relaxed) + self.deferred_runs.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct CoalesceState {
    last_run: Option<Instant>,
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Inner {
    state: Mutex<CoalesceState>,
    wake: Condvar,
    action: Box<dyn Fn() + Send + Sync>,
    metrics: CoalesceMetrics,
}

/// Rate-limiter guaranteeing one action run per burst of triggers.
pub struct DebounceCoalescer {
    inner: Arc<Inner>,
    window: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DebounceCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceCoalescer")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl DebounceCoalescer {
    /// Create a coalescer running `action` with the given window.
    #[must_use]
    pub fn new(window: Duration, action: impl Fn() + Send + Sync + 'static) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(CoalesceState {
                last_run: None,
                deadline: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
            action: Box::new(action),
            metrics: CoalesceMetrics::default(),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("muster-coalesce".to_string())
            .spawn(move || worker_loop(&worker_inner))
            .ok();
        if worker.is_none() {
            tracing::error!("failed to spawn coalescer worker thread");
        }

        Self {
            inner,
            window,
            worker: Mutex::new(worker),
        }
    }

    /// Register a trigger at "now".
    ///
    /// Runs the action on the calling thread when the window has elapsed
    /// since the last run; otherwise (re-)arms the trailing-edge deadline.
    pub fn trigger(&self) {
        let run_now = {
            let mut state = self.inner.state.lock().expect("coalesce lock poisoned");
            if state.shutdown {
                return;
            }

            let now = Instant::now();
            let window_open = state
                .last_run
                .is_none_or(|last| now.duration_since(last) > self.window);

            if window_open {
                state.last_run = Some(now);
                // An immediate run supersedes any pending deferred one.
                state.deadline = None;
                true
            } else {
                let base = state.last_run.unwrap_or(now);
                state.deadline = Some(base + self.window);
                false
            }
        };

        if run_now {
            self.inner.metrics.immediate_runs.fetch_add(1, Ordering::Relaxed);
            (self.inner.action)();
        } else {
            self.inner
                .metrics
                .deferred_triggers
                .fetch_add(1, Ordering::Relaxed);
            self.inner.wake.notify_all();
        }
    }

    /// Telemetry counters.
    #[must_use]
    pub fn metrics(&self) -> &CoalesceMetrics {
        &self.inner.metrics
    }

    /// Whether a deferred run is currently armed.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.deadline.is_some())
            .unwrap_or(false)
    }

    /// Cancel any pending run and stop the worker thread.
    ///
    /// Idempotent; triggers arriving afterwards are ignored.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().expect("coalesce lock poisoned");
            state.shutdown = true;
            state.deadline = None;
        }
        self.inner.wake.notify_all();

        let handle = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("coalescer worker thread panicked");
            }
        }
    }
}

impl Drop for DebounceCoalescer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &Arc<Inner>) {
    let mut state = inner.state.lock().expect("coalesce lock poisoned");

    loop {
        if state.shutdown {
            return;
        }

        match state.deadline {
            None => {
                state = inner
                    .wake
                    .wait(state)
                    .expect("coalesce lock poisoned");
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    state.last_run = Some(now);
                    drop(state);

                    inner.metrics.deferred_runs.fetch_add(1, Ordering::Relaxed);
                    (inner.action)();

                    state = inner.state.lock().expect("coalesce lock poisoned");
                } else {
                    let (next, _timed_out) = inner
                        .wake
                        .wait_timeout(state, deadline - now)
                        .expect("coalesce lock poisoned");
                    state = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const WINDOW: Duration = Duration::from_millis(60);

    fn counting_coalescer() -> (Arc<AtomicUsize>, DebounceCoalescer) {
        let runs = Arc::new(AtomicUsize::new(0));
        let action_runs = Arc::clone(&runs);
        let coalescer = DebounceCoalescer::new(WINDOW, move || {
            action_runs.fetch_add(1, Ordering::SeqCst);
        });
        (runs, coalescer)
    }

    fn wait_for_runs(runs: &AtomicUsize, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if runs.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        runs.load(Ordering::SeqCst) >= expected
    }

    #[test]
    fn first_trigger_runs_immediately() {
        let (runs, coalescer) = counting_coalescer();
        coalescer.trigger();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn burst_collapses_to_exactly_one_deferred_run() {
        let (runs, coalescer) = counting_coalescer();

        let started = Instant::now();
        coalescer.trigger(); // immediate
        for _ in 0..25 {
            coalescer.trigger(); // all inside the window
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(coalescer.has_pending());

        assert!(
            wait_for_runs(&runs, 2, Duration::from_secs(2)),
            "deferred run never fired"
        );
        // Deferred run lands at last_run + window, not later than the last
        // trigger plus one window.
        assert!(started.elapsed() >= WINDOW);

        // Let a settle period confirm no extra runs trickle out.
        thread::sleep(WINDOW + Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(coalescer.metrics().total_runs(), 2);
        assert_eq!(coalescer.metrics().deferred_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_after_quiet_window_runs_immediately_again() {
        let (runs, coalescer) = counting_coalescer();

        coalescer.trigger();
        thread::sleep(WINDOW + Duration::from_millis(20));
        coalescer.trigger();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(
            coalescer.metrics().immediate_runs.load(Ordering::SeqCst),
            2
        );
    }

    #[test]
    fn shutdown_cancels_pending_run() {
        let (runs, coalescer) = counting_coalescer();

        coalescer.trigger(); // immediate
        coalescer.trigger(); // arms a deferred run
        assert!(coalescer.has_pending());

        coalescer.shutdown();
        thread::sleep(WINDOW + Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), 1, "pending run must not fire");
    }

    #[test]
    fn triggers_after_shutdown_are_ignored() {
        let (runs, coalescer) = counting_coalescer();
        coalescer.shutdown();
        coalescer.trigger();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (_runs, coalescer) = counting_coalescer();
        coalescer.shutdown();
        coalescer.shutdown();
    }
}
