use std::sync::Arc;

use arc_swap::ArcSwap;

use keyspin_cache::Counter;
use keyspin_common::GlobalConfig;
use keyspin_storage::ConfigStore;

use crate::auth::ProxyAuth;
use crate::dispatch::Dispatcher;
use crate::rotate::KeyRotator;
use crate::upstream::UpstreamClient;

/// Everything a request handler needs, shared across all connections.
pub struct AppState {
    pub global: ArcSwap<GlobalConfig>,
    pub auth: ProxyAuth,
    pub store: Arc<dyn ConfigStore>,
    pub counter: Arc<dyn Counter>,
    pub rotator: KeyRotator,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(
        global: GlobalConfig,
        store: Arc<dyn ConfigStore>,
        counter: Arc<dyn Counter>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        let auth = ProxyAuth::from_global(&global);
        Self {
            global: ArcSwap::from_pointee(global),
            auth,
            store,
            rotator: KeyRotator::new(Arc::clone(&counter)),
            counter,
            dispatcher: Dispatcher::new(upstream),
        }
    }
}
