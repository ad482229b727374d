//! Shared application state.

use relay_config::GatewayConfig;
use relay_providers::{RetryConfig, UpstreamClient, UpstreamConfig};
use relay_scheduler::{HealthPolicy, Scheduler};
use std::sync::Arc;
use std::time::Instant;

/// Everything handlers need, cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub scheduler: Arc<Scheduler>,
    pub upstream: Arc<UpstreamClient>,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let scheduler = Scheduler::new(
            HealthPolicy {
                failure_threshold: config.failure_threshold,
                cooldown: config.cooldown,
                probes_to_close: config.probes_to_close,
            },
            config.selection_policy,
        );
        let upstream = UpstreamClient::new(UpstreamConfig {
            base_url: config.upstream_base_url.clone(),
            api_version: config.upstream_api_version.clone(),
            timeout: config.upstream_timeout,
            retry: RetryConfig {
                max_retries: config.retry_count,
                base_delay: config.retry_delay,
            },
        });
        Self {
            config: Arc::new(config),
            scheduler: Arc::new(scheduler),
            upstream: Arc::new(upstream),
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
