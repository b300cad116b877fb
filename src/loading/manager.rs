//! # Loading State Manager
//!
//! Shared registry of named loading operations. One instance is created by
//! the application (see [`crate::system_context::SystemContext`]) and cloned
//! into every consumer; clones share the same registry.
//!
//! All mutations go through the manager's methods. Listeners are notified
//! after the registry lock is released, with a snapshot of every active
//! context, so a listener can call back into the manager safely.
//!
//! Timeout timers are tokio tasks. A timer only flags `has_timed_out` and
//! swaps the message; it never hides the context. Hiding, overwriting or
//! clearing a context aborts its timer.

use super::types::{sanitize_progress, LoadingContext, LoadingState, OperationType};
use crate::config::LoadingSettings;
use crate::utils::{ListenerRegistry, Subscription};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Every active context, keyed by id
pub type LoadingSnapshot = HashMap<String, LoadingState>;

struct TrackedContext {
    state: LoadingState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl TrackedContext {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    contexts: Mutex<HashMap<String, TrackedContext>>,
    listeners: ListenerRegistry<LoadingSnapshot>,
    default_timeout: Duration,
    global_types: Vec<OperationType>,
    generation: AtomicU64,
}

impl Inner {
    fn snapshot(contexts: &HashMap<String, TrackedContext>) -> LoadingSnapshot {
        contexts
            .iter()
            .map(|(id, tracked)| (id.clone(), tracked.state.clone()))
            .collect()
    }

    fn mark_timed_out(&self, id: &str, generation: u64) {
        let snapshot = {
            let mut contexts = self.contexts.lock();
            match contexts.get_mut(id) {
                Some(tracked) if tracked.generation == generation && tracked.state.is_loading => {
                    tracked.timer = None;
                    tracked.state.has_timed_out = true;
                    tracked.state.message =
                        tracked.state.operation_type.timed_out_message().to_string();
                    warn!(
                        context_id = %id,
                        elapsed_ms = tracked.state.elapsed().as_millis() as u64,
                        "⏱️ Loading operation exceeded its timeout"
                    );
                    Self::snapshot(&contexts)
                }
                _ => return,
            }
        };
        self.listeners.notify(&snapshot);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for tracked in self.contexts.get_mut().values_mut() {
            tracked.cancel_timer();
        }
    }
}

#[derive(Clone)]
pub struct LoadingStateManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LoadingStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingStateManager")
            .field("active_contexts", &self.active_count())
            .field("default_timeout", &self.inner.default_timeout)
            .field("global_types", &self.inner.global_types)
            .finish()
    }
}

impl Default for LoadingStateManager {
    fn default() -> Self {
        Self::from_settings(&LoadingSettings::default())
    }
}

impl LoadingStateManager {
    pub fn new(default_timeout: Duration, global_types: Vec<OperationType>) -> Self {
        Self {
            inner: Arc::new(Inner {
                contexts: Mutex::new(HashMap::new()),
                listeners: ListenerRegistry::new("loading_state"),
                default_timeout,
                global_types,
                generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_settings(settings: &LoadingSettings) -> Self {
        Self::new(
            settings.default_timeout(),
            settings.global_operation_types.clone(),
        )
    }

    fn resolve_timeout(&self, context: &LoadingContext) -> Option<Duration> {
        match context.timeout_ms {
            None if self.inner.default_timeout.is_zero() => None,
            None => Some(self.inner.default_timeout),
            Some(ms) if ms <= 0 => None,
            Some(ms) => Some(Duration::from_millis(ms as u64)),
        }
    }

    fn spawn_timer(&self, id: &str, generation: u64, timeout: Duration) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(context_id = %id, "No tokio runtime available; loading timeout disabled");
                return None;
            }
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = id.to_string();
        Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.mark_timed_out(&id, generation);
            }
        }))
    }

    /// Start (or restart) tracking `context.id`
    pub fn show_loading(&self, context: LoadingContext) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let timeout = self.resolve_timeout(&context);
        let timer = timeout.and_then(|timeout| self.spawn_timer(&context.id, generation, timeout));

        let state = LoadingState {
            id: context.id.clone(),
            operation_type: context.operation_type,
            is_loading: true,
            message: context
                .message
                .unwrap_or_else(|| context.operation_type.default_message().to_string()),
            progress: context.show_progress.then_some(0.0),
            has_timed_out: false,
            started_at: Utc::now(),
            started: Instant::now(),
        };

        debug!(
            context_id = %context.id,
            operation_type = %context.operation_type,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Loading started"
        );

        let snapshot = {
            let mut contexts = self.inner.contexts.lock();
            if let Some(mut previous) = contexts.insert(
                context.id,
                TrackedContext {
                    state,
                    generation,
                    timer,
                },
            ) {
                previous.cancel_timer();
            }
            Inner::snapshot(&contexts)
        };
        self.inner.listeners.notify(&snapshot);
    }

    /// Stop tracking `id`; no-op when absent
    pub fn hide_loading(&self, id: &str) {
        let snapshot = {
            let mut contexts = self.inner.contexts.lock();
            match contexts.remove(id) {
                Some(mut tracked) => {
                    tracked.cancel_timer();
                    debug!(
                        context_id = %id,
                        duration_ms = tracked.state.elapsed().as_millis() as u64,
                        "Loading finished"
                    );
                    Inner::snapshot(&contexts)
                }
                None => return,
            }
        };
        self.inner.listeners.notify(&snapshot);
    }

    /// Set progress (clamped to 0-100, non-finite → 0) on a progress-enabled context
    pub fn update_progress(&self, id: &str, value: f64) {
        let value = sanitize_progress(value);
        let snapshot = {
            let mut contexts = self.inner.contexts.lock();
            match contexts.get_mut(id) {
                Some(tracked) if tracked.state.progress.is_some() => {
                    tracked.state.progress = Some(value);
                    Inner::snapshot(&contexts)
                }
                _ => return,
            }
        };
        self.inner.listeners.notify(&snapshot);
    }

    /// Replace the message of an existing context; no-op when absent
    pub fn set_loading_message(&self, id: &str, message: impl Into<String>) {
        let snapshot = {
            let mut contexts = self.inner.contexts.lock();
            match contexts.get_mut(id) {
                Some(tracked) => {
                    tracked.state.message = message.into();
                    Inner::snapshot(&contexts)
                }
                None => return,
            }
        };
        self.inner.listeners.notify(&snapshot);
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LoadingSnapshot) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    pub fn get_loading_state(&self, id: &str) -> Option<LoadingState> {
        self.inner
            .contexts
            .lock()
            .get(id)
            .map(|tracked| tracked.state.clone())
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.inner.contexts.lock().contains_key(id)
    }

    /// Elapsed time since `show_loading`, zero when absent
    pub fn get_loading_duration(&self, id: &str) -> Duration {
        self.inner
            .contexts
            .lock()
            .get(id)
            .map(|tracked| tracked.state.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// True when any active context has a global operation type
    pub fn should_show_global_loading(&self) -> bool {
        self.inner
            .contexts
            .lock()
            .values()
            .any(|tracked| self.inner.global_types.contains(&tracked.state.operation_type))
    }

    pub fn active_count(&self) -> usize {
        self.inner.contexts.lock().len()
    }

    pub fn active_context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.contexts.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove every context and cancel every timer
    pub fn clear_all(&self) {
        let cleared = {
            let mut contexts = self.inner.contexts.lock();
            let count = contexts.len();
            for (_, mut tracked) in contexts.drain() {
                tracked.cancel_timer();
            }
            count
        };
        if cleared > 0 {
            debug!(cleared = cleared, "Cleared all loading contexts");
            self.inner.listeners.notify(&LoadingSnapshot::new());
        }
    }
}
