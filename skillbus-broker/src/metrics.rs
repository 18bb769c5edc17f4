//! Broker metrics
//!
//! OpenTelemetry instruments for the broker's two pipelines. All
//! instruments are prefixed `skillbus.broker.*` and recorded only when
//! observability is enabled on the builder; the hot paths carry an
//! `Option<Arc<BrokerMetrics>>` and skip recording entirely otherwise.

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Metrics instruments for one broker instance
pub struct BrokerMetrics {
    /// Inbound requests processed, tagged with path and status
    pub requests_total: Counter<u64>,
    /// Handler execution latency in seconds
    pub request_duration: Histogram<f64>,
    /// Publish calls accepted
    pub publish_total: Counter<u64>,
    /// Successful deliveries to subscribers
    pub deliveries_total: Counter<u64>,
    /// Deliveries resubmitted after a timeout
    pub delivery_retries_total: Counter<u64>,
    /// Subscribers evicted on terminal delivery failures
    pub evictions_total: Counter<u64>,
    /// Current subscriber count per topic
    pub subscribers_active: Gauge<i64>,
}

impl BrokerMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("skillbus.broker.requests.total")
                .with_description("Total inbound requests processed")
                .build(),
            request_duration: meter
                .f64_histogram("skillbus.broker.request.duration")
                .with_description("Handler execution duration in seconds")
                .build(),
            publish_total: meter
                .u64_counter("skillbus.broker.publish.total")
                .with_description("Total publish calls accepted")
                .build(),
            deliveries_total: meter
                .u64_counter("skillbus.broker.deliveries.total")
                .with_description("Total successful deliveries to subscribers")
                .build(),
            delivery_retries_total: meter
                .u64_counter("skillbus.broker.delivery.retries.total")
                .with_description("Total deliveries retried after timeout")
                .build(),
            evictions_total: meter
                .u64_counter("skillbus.broker.evictions.total")
                .with_description("Total subscribers evicted")
                .build(),
            subscribers_active: meter
                .i64_gauge("skillbus.broker.subscribers.active")
                .with_description("Current number of subscribers per topic")
                .build(),
        }
    }

    pub fn record_request(&self, path: &str, status: u16, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("path", path.to_string()),
            KeyValue::new("status", status as i64),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_publish(&self, topic: &str) {
        self.publish_total
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub fn record_delivery(&self, topic: &str) {
        self.deliveries_total
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub fn record_retry(&self, topic: &str) {
        self.delivery_retries_total
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub fn record_eviction(&self, topic: &str) {
        self.evictions_total
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub fn update_subscribers(&self, topic: &str, count: i64) {
        self.subscribers_active
            .record(count, &[KeyValue::new("topic", topic.to_string())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_does_not_panic() {
        let metrics = BrokerMetrics::new("test-broker");
        metrics.record_request("/subscribe", 200, 0.002);
        metrics.record_request("/ping", 404, 0.0);
        metrics.record_publish("weather");
        metrics.record_delivery("weather");
        metrics.record_retry("weather");
        metrics.record_eviction("weather");
        metrics.update_subscribers("weather", 3);
    }
}
