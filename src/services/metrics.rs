use std::time::{Duration, Instant};

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct MetricsService {
    registry: Registry,
    ads_watched: IntCounter,
    ad_quota_rejections: IntCounter,
    withdrawals_created: IntCounter,
    withdrawals_resolved: IntCounterVec,
    transaction_retries: IntCounterVec,
    http_requests: IntCounterVec,
    request_duration: HistogramVec,
}

impl MetricsService {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ads_watched = IntCounter::new("ads_watched_total", "Accepted ad views").unwrap();
        let ad_quota_rejections = IntCounter::new(
            "ad_quota_rejections_total",
            "Ad views refused because the daily limit was reached",
        )
        .unwrap();
        let withdrawals_created =
            IntCounter::new("withdrawals_created_total", "Withdrawal requests submitted").unwrap();
        let withdrawals_resolved = IntCounterVec::new(
            Opts::new("withdrawals_resolved_total", "Withdrawal requests resolved"),
            &["decision"],
        )
        .unwrap();
        let transaction_retries = IntCounterVec::new(
            Opts::new(
                "store_transaction_retries_total",
                "Transaction attempts retried after a conflict or transient failure",
            ),
            &["operation"],
        )
        .unwrap();
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP responses by status class"),
            &["class"],
        )
        .unwrap();
        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency"),
            &["endpoint"],
        )
        .unwrap();

        for collector in [
            Box::new(ads_watched.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(ad_quota_rejections.clone()),
            Box::new(withdrawals_created.clone()),
            Box::new(withdrawals_resolved.clone()),
            Box::new(transaction_retries.clone()),
            Box::new(http_requests.clone()),
            Box::new(request_duration.clone()),
        ] {
            registry.register(collector).unwrap();
        }

        Self {
            registry,
            ads_watched,
            ad_quota_rejections,
            withdrawals_created,
            withdrawals_resolved,
            transaction_retries,
            http_requests,
            request_duration,
        }
    }

    pub fn record_ad_watched(&self) {
        self.ads_watched.inc();
    }

    pub fn record_quota_rejection(&self) {
        self.ad_quota_rejections.inc();
    }

    pub fn record_withdrawal_created(&self) {
        self.withdrawals_created.inc();
    }

    pub fn record_withdrawal_resolved(&self, decision: &str) {
        self.withdrawals_resolved.with_label_values(&[decision]).inc();
    }

    pub fn record_transaction_retry(&self, operation: &str) {
        self.transaction_retries.with_label_values(&[operation]).inc();
    }

    pub fn record_response(&self, class: &str) {
        self.http_requests.with_label_values(&[class]).inc();
    }

    pub fn record_request_duration(&self, duration: Duration, endpoint: &str) {
        self.request_duration
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RequestTimer<'a> {
    metrics: &'a MetricsService,
    start: Instant,
    endpoint: String,
}

impl<'a> RequestTimer<'a> {
    pub fn new(metrics: &'a MetricsService, endpoint: String) -> Self {
        Self {
            metrics,
            start: Instant::now(),
            endpoint,
        }
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .record_request_duration(self.start.elapsed(), &self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_counters() {
        let metrics = MetricsService::new();
        metrics.record_ad_watched();
        metrics.record_withdrawal_resolved("rejected");

        let text = metrics.render().unwrap();
        assert!(text.contains("ads_watched_total 1"));
        assert!(text.contains("withdrawals_resolved_total{decision=\"rejected\"} 1"));
    }
}
