use crate::config::ConfigManager;
use crate::error::{HarvestError, Result};
use crate::events::EventPublisher;
use crate::execution::{SimulatedStepExecutor, StepExecutor};
use crate::gating::ActionGate;
use crate::loading::LoadingStateManager;
use crate::orchestration::{ActionEngine, ActionEngineConfig};
use crate::resilience::{ErrorHandlingSystem, NetworkStatusManager};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared service instances and configuration
///
/// One context is created at application start and handed to consumers by
/// reference. It serves as a dependency injection container providing:
/// - Configuration manager
/// - Loading state manager
/// - Network status manager and response cache
/// - Error handling system
/// - Action engine over the configured step executor
/// - Action gate
/// - Lifecycle event publisher
pub struct SystemContext {
    /// System instance ID
    pub system_id: Uuid,

    /// Configuration manager with environment-aware loading
    pub config_manager: Arc<ConfigManager>,

    pub loading: LoadingStateManager,

    pub network: NetworkStatusManager,

    pub error_handler: Arc<ErrorHandlingSystem>,

    pub action_engine: Arc<ActionEngine>,

    pub action_gate: Arc<ActionGate>,

    pub event_publisher: EventPublisher,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system_id", &self.system_id)
            .field("environment", &self.config_manager.environment())
            .field("loading", &self.loading)
            .field("network", &self.network)
            .field("action_engine", &self.action_engine)
            .finish()
    }
}

impl SystemContext {
    /// Create SystemContext with environment-aware configuration loading
    pub fn new() -> Result<Self> {
        info!("🔧 Initializing SystemContext with auto-detected environment configuration");

        let config_manager = ConfigManager::load().map_err(|e| {
            HarvestError::Configuration(format!("Failed to load configuration: {e}"))
        })?;

        Ok(Self::from_config(config_manager))
    }

    /// Create SystemContext with the simulated step executor
    pub fn from_config(config_manager: Arc<ConfigManager>) -> Self {
        Self::with_executor(config_manager, Arc::new(SimulatedStepExecutor::new()))
    }

    /// Create SystemContext over a specific step executor backend
    pub fn with_executor(
        config_manager: Arc<ConfigManager>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        info!(
            environment = %config_manager.environment(),
            executor = executor.executor_name(),
            "🏗️ Creating system components with unified configuration"
        );

        let config = config_manager.config();

        let event_publisher = EventPublisher::new(config.events.channel_capacity);
        let loading = LoadingStateManager::from_settings(&config.loading);
        let network = NetworkStatusManager::new(&config.cache, &config.network);
        let error_handler = Arc::new(ErrorHandlingSystem::from_settings(&config.retry));
        let action_engine = Arc::new(
            ActionEngine::new(executor, ActionEngineConfig::from_settings(&config.execution))
                .with_loading_manager(loading.clone())
                .with_event_publisher(event_publisher.clone()),
        );

        info!("✅ SystemContext components created successfully");

        Self {
            system_id: Uuid::new_v4(),
            config_manager,
            loading,
            network,
            error_handler,
            action_engine,
            action_gate: Arc::new(ActionGate::new()),
            event_publisher,
        }
    }

    /// Start background maintenance; requires a tokio runtime
    pub fn start_background_services(&self) {
        self.network.start_cache_sweeper();
    }

    /// Cancel background tasks, in-flight runs, pending recovery retries and
    /// every loading context
    pub fn shutdown(&self) {
        info!(system_id = %self.system_id, "🛑 Shutting down SystemContext");
        self.action_engine.cancel();
        self.error_handler.shutdown();
        self.network.shutdown();
        self.loading.clear_all();
    }
}
