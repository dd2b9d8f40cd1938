//! HTTP metrics registry and Prometheus text exposition.
//!
//! Requests are recorded by a middleware into an in-process registry and
//! rendered by hand in the Prometheus text format at scrape time. Metric
//! names and buckets are stable scrape targets; existing dashboards depend
//! on them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;

use crate::state::AppState;

/// Histogram bucket upper bounds, in seconds.
const DURATION_BUCKETS: [f64; 7] = [0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0];

/// Per-label-set request statistics.
#[derive(Debug, Default, Clone)]
struct RequestStats {
    count: u64,
    sum_seconds: f64,
    /// Cumulative counts per bucket in [`DURATION_BUCKETS`] order.
    buckets: [u64; DURATION_BUCKETS.len()],
}

/// In-process HTTP metrics, keyed by (method, route, status).
#[derive(Default)]
pub struct HttpMetrics {
    requests: Mutex<BTreeMap<(String, String, u16), RequestStats>>,
}

impl HttpMetrics {
    pub fn record(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let mut requests = self.requests.lock();
        let stats = requests
            .entry((method.to_owned(), route.to_owned(), status))
            .or_default();
        stats.count += 1;
        stats.sum_seconds += seconds;
        for (i, le) in DURATION_BUCKETS.iter().enumerate() {
            if seconds <= *le {
                stats.buckets[i] += 1;
            }
        }
    }

    /// Render every metric in Prometheus text format.
    ///
    /// `active_connections` is the pool's current open-connection count,
    /// exposed as a gauge alongside the request metrics.
    pub fn render(&self, active_connections: usize) -> String {
        let requests = self.requests.lock().clone();
        let mut out = String::new();

        out.push_str(
            "# HELP app_tier_http_request_duration_seconds Duration of HTTP requests in seconds.\n",
        );
        out.push_str("# TYPE app_tier_http_request_duration_seconds histogram\n");
        for ((method, route, status), stats) in &requests {
            for (i, le) in DURATION_BUCKETS.iter().enumerate() {
                out.push_str(&format!(
                    "app_tier_http_request_duration_seconds_bucket{{method=\"{}\",route=\"{}\",status_code=\"{}\",le=\"{}\"}} {}\n",
                    method, route, status, le, stats.buckets[i]
                ));
            }
            out.push_str(&format!(
                "app_tier_http_request_duration_seconds_bucket{{method=\"{}\",route=\"{}\",status_code=\"{}\",le=\"+Inf\"}} {}\n",
                method, route, status, stats.count
            ));
            out.push_str(&format!(
                "app_tier_http_request_duration_seconds_sum{{method=\"{}\",route=\"{}\",status_code=\"{}\"}} {}\n",
                method, route, status, stats.sum_seconds
            ));
            out.push_str(&format!(
                "app_tier_http_request_duration_seconds_count{{method=\"{}\",route=\"{}\",status_code=\"{}\"}} {}\n",
                method, route, status, stats.count
            ));
        }

        out.push_str("# HELP app_tier_http_requests_total Total number of HTTP requests.\n");
        out.push_str("# TYPE app_tier_http_requests_total counter\n");
        for ((method, route, status), stats) in &requests {
            out.push_str(&format!(
                "app_tier_http_requests_total{{method=\"{}\",route=\"{}\",status_code=\"{}\"}} {}\n",
                method, route, status, stats.count
            ));
        }

        out.push_str("# HELP app_tier_active_connections Number of active database connections.\n");
        out.push_str("# TYPE app_tier_active_connections gauge\n");
        out.push_str(&format!(
            "app_tier_active_connections {}\n",
            active_connections
        ));

        out
    }
}

/// Middleware recording method/route/status and latency for every request.
pub async fn track(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    // Prefer the matched route template so ids don't explode cardinality.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let response = next.run(req).await;

    state
        .metrics
        .record(&method, &route, response.status().as_u16(), start.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_empty() {
        let metrics = HttpMetrics::default();
        let output = metrics.render(0);
        // Should still have type declarations.
        assert!(output.contains("# HELP app_tier_http_requests_total"));
        assert!(output.contains("# TYPE app_tier_http_request_duration_seconds histogram"));
        assert!(output.contains("app_tier_active_connections 0"));
    }

    #[test]
    fn render_single_request() {
        let metrics = HttpMetrics::default();
        metrics.record("GET", "/transaction", 200, Duration::from_millis(50));

        let output = metrics.render(3);
        assert!(output.contains(
            "app_tier_http_requests_total{method=\"GET\",route=\"/transaction\",status_code=\"200\"} 1"
        ));
        assert!(output.contains(
            "app_tier_http_request_duration_seconds_count{method=\"GET\",route=\"/transaction\",status_code=\"200\"} 1"
        ));
        assert!(output.contains("app_tier_active_connections 3"));
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let metrics = HttpMetrics::default();
        metrics.record("GET", "/health", 200, Duration::from_millis(5));
        metrics.record("GET", "/health", 200, Duration::from_millis(200));

        let output = metrics.render(0);
        // 5ms lands in the 0.01 bucket and everything above it.
        assert!(output.contains("le=\"0.001\"} 0"));
        assert!(output.contains("le=\"0.01\"} 1"));
        assert!(output.contains("le=\"0.1\"} 1"));
        // 200ms joins at 0.5 and above.
        assert!(output.contains("le=\"0.5\"} 2"));
        assert!(output.contains("le=\"5\"} 2"));
        assert!(output.contains("le=\"+Inf\"} 2"));
    }

    #[test]
    fn labels_are_kept_separate() {
        let metrics = HttpMetrics::default();
        metrics.record("GET", "/transaction", 200, Duration::from_millis(1));
        metrics.record("POST", "/transaction", 200, Duration::from_millis(1));
        metrics.record("GET", "/transaction", 503, Duration::from_millis(1));

        let output = metrics.render(0);
        assert!(output.contains(
            "app_tier_http_requests_total{method=\"GET\",route=\"/transaction\",status_code=\"200\"} 1"
        ));
        assert!(output.contains(
            "app_tier_http_requests_total{method=\"POST\",route=\"/transaction\",status_code=\"200\"} 1"
        ));
        assert!(output.contains(
            "app_tier_http_requests_total{method=\"GET\",route=\"/transaction\",status_code=\"503\"} 1"
        ));
    }
}
