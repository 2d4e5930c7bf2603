//! Shared application state.

use std::sync::Arc;

use waymark_catalog::model::Catalog;
use waymark_core::clock::Clock;
use waymark_core::delivery::DeliveryChannel;
use waymark_core::store::ProgressStore;
use waymark_engine::{EngineContext, SchedulePolicy};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The validated catalog, loaded once at startup.
    pub catalog: Arc<Catalog>,
    /// The shared progress store.
    pub store: Arc<dyn ProgressStore>,
    /// The outbound delivery channel.
    pub delivery: Arc<dyn DeliveryChannel>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Morning-delay policy for scheduled messages.
    pub policy: SchedulePolicy,
    /// Shared secret the periodic dispatch trigger authenticates with.
    pub dispatch_secret: String,
}

impl AppState {
    /// Creates new application state.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn ProgressStore>,
        delivery: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
        policy: SchedulePolicy,
        dispatch_secret: String,
    ) -> Self {
        Self {
            catalog,
            store,
            delivery,
            clock,
            policy,
            dispatch_secret,
        }
    }

    /// Borrows the state as an engine context for one operation.
    #[must_use]
    pub fn engine_ctx(&self) -> EngineContext<'_> {
        EngineContext {
            catalog: self.catalog.as_ref(),
            store: self.store.as_ref(),
            delivery: self.delivery.as_ref(),
            clock: self.clock.as_ref(),
            policy: &self.policy,
        }
    }
}
