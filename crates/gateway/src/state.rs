use std::sync::Arc;

use ad_broker::Broker;
use ad_domain::config::Config;
use ad_llm::{StructuredLlm, UsageLedger};
use ad_notify::SessionNotifier;
use ad_store::Store;

use crate::engine::TaskEngine;

/// Shared application state passed to all API handlers and worker loops.
///
/// Everything here is a process-wide handle initialised once at boot; the
/// engine itself is stateless apart from these collaborators.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Persistence & messaging ───────────────────────────────────────
    pub store: Store,
    pub broker: Arc<Broker>,

    // ── External collaborators ────────────────────────────────────────
    pub llm: Arc<dyn StructuredLlm>,
    pub notifier: Arc<SessionNotifier>,
    pub usage: Arc<UsageLedger>,

    // ── Engine ────────────────────────────────────────────────────────
    pub engine: Arc<TaskEngine>,
}
