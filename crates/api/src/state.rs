use std::sync::Arc;

use roadwatch_pipeline::ReviewService;
use roadwatch_worker::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool and services are handles.
#[derive(Clone)]
pub struct AppState {
    pub pool: roadwatch_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Publishes notifications; consumed by persistence and the gateway.
    pub event_bus: Arc<roadwatch_events::EventBus>,
    pub orchestrator: Orchestrator,
    pub reviews: ReviewService,
}

impl AppState {
    pub fn new(
        pool: roadwatch_db::DbPool,
        config: ServerConfig,
        event_bus: Arc<roadwatch_events::EventBus>,
    ) -> Self {
        let notifier = roadwatch_events::Notifier::new(Arc::clone(&event_bus));
        Self {
            orchestrator: Orchestrator::new(pool.clone()),
            reviews: ReviewService::new(pool.clone(), notifier),
            pool,
            config: Arc::new(config),
            event_bus,
        }
    }
}
