use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::identity::{HeaderTenancy, NoTenancy, TenancyExtractor};
use crate::metrics::Metrics;
use crate::registry::PeerRegistry;

/// Shared gateway state, cheaply cloneable. Everything the front-door, the
/// `Register` RPC handler, and the admin server need to serve a request.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub metrics: Metrics,
    pub registry: Arc<PeerRegistry>,
    pub tenancy: Arc<dyn TenancyExtractor>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let metrics = Metrics::install();
        let tenancy: Arc<dyn TenancyExtractor> = if config.tenancy.enabled {
            Arc::new(HeaderTenancy::new(config.tenancy.header_name.clone()))
        } else {
            Arc::new(NoTenancy)
        };

        Self {
            config: Arc::new(config),
            metrics,
            registry: Arc::new(PeerRegistry::new()),
            tenancy,
        }
    }
}
