//! Shared dispatch state.
//!
//! One [`DispatchContext`] is built at startup and injected into the router,
//! the HTTP layer and background tasks. Tests build their own, isolated ones.

use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::ledger::ExecutionLedger;
use crate::resilience::BreakerRegistry;
use crate::settings::SettingsProvider;

/// Cache, breaker registry, ledger and settings provider.
///
/// Cloning shares every component.
#[derive(Clone)]
pub struct DispatchContext {
    pub cache: Arc<dyn ResponseCache>,
    pub breakers: BreakerRegistry,
    pub ledger: Arc<ExecutionLedger>,
    pub settings: Arc<dyn SettingsProvider>,
}

impl DispatchContext {
    pub fn new(
        cache: Arc<dyn ResponseCache>,
        breakers: BreakerRegistry,
        ledger: Arc<ExecutionLedger>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            cache,
            breakers,
            ledger,
            settings,
        }
    }
}
