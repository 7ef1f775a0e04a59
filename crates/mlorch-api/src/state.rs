//! Application state wiring the engine to its infrastructure.
//!
//! `AppState` is shared by the HTTP handlers and the one-shot CLI. The
//! catalog, config and HTTP client are immutable after startup; each request
//! gets its own execution context.

use std::sync::Arc;
use std::time::Duration;

use mlorch_core::event::{EventBus, TracingSink};
use mlorch_core::workflow::{FlowExecutor, FlowRouter};
use mlorch_infra::catalog::load_catalog;
use mlorch_infra::config::step_defaults;
use mlorch_infra::dedup::DuplicateTracker;
use mlorch_infra::http::HttpInvoker;
use mlorch_infra::webhook::WebhookNotifier;
use mlorch_types::config::OrchestratorConfig;
use mlorch_types::workflow::Catalog;

/// Flow executor pinned to the reqwest invoker.
pub type ConcreteFlowExecutor = FlowExecutor<HttpInvoker>;

/// Capacity of the execution event channel.
const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OrchestratorConfig>,
    pub router: FlowRouter,
    pub executor: Arc<ConcreteFlowExecutor>,
    pub events: EventBus,
    /// `None` when duplicate detection is disabled.
    pub dedup: Option<Arc<DuplicateTracker>>,
    pub webhook: WebhookNotifier,
}

impl AppState {
    /// Load the catalog named by `config` and wire all services.
    pub async fn init(config: OrchestratorConfig) -> anyhow::Result<Self> {
        let catalog = load_catalog(&config).await?;
        Self::build(config, catalog)
    }

    /// Wire services around an already-loaded catalog.
    pub fn build(config: OrchestratorConfig, catalog: Catalog) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let invoker = Arc::new(HttpInvoker::new(Arc::clone(&config))?);
        let events = EventBus::new(EVENT_CAPACITY);

        let executor = FlowExecutor::new(invoker, step_defaults(&config.executor))
            .with_flow_deadline(Duration::from_secs(config.executor.flow_deadline_secs))
            .with_sink(Arc::new(TracingSink))
            .with_sink(Arc::new(events.clone()));

        let dedup = config
            .dedup
            .enabled
            .then(|| Arc::new(DuplicateTracker::new(Duration::from_secs(config.dedup.ttl_secs))));
        let webhook = WebhookNotifier::new(&config.webhook)?;

        Ok(Self {
            router: FlowRouter::new(Arc::new(catalog)),
            executor: Arc::new(executor),
            events,
            dedup,
            webhook,
            config,
        })
    }
}
