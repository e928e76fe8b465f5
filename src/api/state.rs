//! API shared state

use std::sync::Arc;

use crate::actors::dispatch::DispatchHandle;
use crate::hub::Hub;
use crate::limiter::RateLimiter;
use crate::store::DeviceStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Authoritative device/alert/command state
    pub store: Arc<dyn DeviceStore>,

    /// Fan-out hub backing the WebSocket feed
    pub hub: Arc<Hub>,

    /// Handle to the command dispatcher
    pub dispatcher: DispatchHandle,

    /// Admission limiter; `None` disables rate limiting entirely
    pub limiter: Option<Arc<RateLimiter>>,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        hub: Arc<Hub>,
        dispatcher: DispatchHandle,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            store,
            hub,
            dispatcher,
            limiter,
        }
    }
}
