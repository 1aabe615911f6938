//! # Metrics
//!
//! Counters for the cache, the upstream API and the credential lifecycle,
//! recorded through the `metrics` facade and exported in Prometheus text
//! format. When no recorder is installed the counters are no-ops.
//!
//! | Metric                          | Labels               |
//! |---------------------------------|----------------------|
//! | `cache_hits_total`              | `resource`           |
//! | `cache_misses_total`            | `resource`           |
//! | `upstream_fetches_total`        | `outcome`            |
//! | `upstream_errors_total`         | `status`             |
//! | `token_acquisitions_total`      | `outcome`            |
//! | `precache_nodes_fetched_total`  |                      |
//! | `precache_jobs_dropped_total`   |                      |

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::error::{ProxyError, ProxyResult};

/// Install the Prometheus recorder globally and return the handle that renders
/// the exposition text
pub fn install_prometheus() -> ProxyResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ProxyError::internal(format!("Failed to install Prometheus recorder: {}", e)))
}

pub fn record_cache_lookup(resource: &'static str, hit: bool) {
    if hit {
        counter!("cache_hits_total", "resource" => resource).increment(1);
    } else {
        counter!("cache_misses_total", "resource" => resource).increment(1);
    }
}

/// Record one upstream request; `error_status` is `Some` for failures
pub fn record_upstream_fetch(result: Result<(), Option<u16>>) {
    match result {
        Ok(()) => {
            counter!("upstream_fetches_total", "outcome" => "success").increment(1);
        }
        Err(status) => {
            counter!("upstream_fetches_total", "outcome" => "error").increment(1);
            let status = status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
            counter!("upstream_errors_total", "status" => status).increment(1);
        }
    }
}

pub fn record_token_acquisition(success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!("token_acquisitions_total", "outcome" => outcome).increment(1);
}

pub fn record_precache_nodes_fetched(count: u64) {
    counter!("precache_nodes_fetched_total").increment(count);
}

pub fn record_precache_job_dropped() {
    counter!("precache_jobs_dropped_total").increment(1);
}
