//! Shared builders for integration tests.

#![allow(dead_code)]

use harvest_engine::events::{EventPublisher, HarvestEvent};
use harvest_engine::execution::{ExecutionConfig, SimulatedStepExecutor};
use harvest_engine::loading::LoadingStateManager;
use harvest_engine::models::{ExecutionStep, HarvestSession};
use harvest_engine::orchestration::{ActionEngine, ActionEngineConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Approve, swap, then a manual sell on an exchange
pub fn three_step_session() -> HarvestSession {
    HarvestSession::new(vec![
        ExecutionStep::on_chain("approve", 1, "Approve USDC spending"),
        ExecutionStep::on_chain("swap", 2, "Swap USDC for ETH").with_guardian_score(8.5),
        ExecutionStep::cex_manual("sell", 3, "Sell ETH for tax loss", "Coinbase"),
    ])
    .with_session_id("session-test")
}

/// Engine over the simulator with no random failures and fixed step pacing
pub fn deterministic_config() -> ActionEngineConfig {
    ActionEngineConfig {
        execution: ExecutionConfig::deterministic()
            .with_step_delay(Duration::from_millis(100), Duration::from_millis(100)),
        retry_failure_probability: None,
    }
}

pub struct EngineHarness {
    pub engine: Arc<ActionEngine>,
    pub loading: LoadingStateManager,
    pub events: broadcast::Receiver<harvest_engine::events::PublishedEvent>,
    pub successes: Arc<AtomicUsize>,
    pub errors: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl EngineHarness {
    pub fn new(config: ActionEngineConfig) -> Self {
        let loading = LoadingStateManager::default();
        let publisher = EventPublisher::new(256);
        let events = publisher.subscribe();
        let engine = Arc::new(
            ActionEngine::new(Arc::new(SimulatedStepExecutor::new()), config)
                .with_loading_manager(loading.clone())
                .with_event_publisher(publisher),
        );

        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let successes = Arc::clone(&successes);
            engine.on_success(move |_| {
                successes.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let errors = Arc::clone(&errors);
            engine.on_error(move |reason, _| errors.lock().push(reason.to_string()));
        }

        Self {
            engine,
            loading,
            events,
            successes,
            errors,
        }
    }

    pub fn success_count(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn error_reasons(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Drain every event published so far
    pub fn drain_events(&mut self) -> Vec<HarvestEvent> {
        let mut events = Vec::new();
        while let Ok(published) = self.events.try_recv() {
            events.push(published.event);
        }
        events
    }
}
