//! prometheus meters of the relay

use once_cell::sync::Lazy;
use prometheus::{
	exponential_buckets, histogram_opts, opts, register_histogram_vec, register_int_counter_vec,
	HistogramTimer, HistogramVec, IntCounterVec,
};

use crate::alert::Status;

#[allow(clippy::expect_used)]
static METRICS: Lazy<Metrics> =
	Lazy::new(|| Metrics::new().expect("failed to register prometheus meters"));

#[derive(Debug)]
/// prometheus meters for the webhook receiver and the gotify client
pub(crate) struct Metrics {
	/// number of deserialized alerts
	received_alerts: IntCounterVec,
	/// gotify messages created or deleted by the relay
	messages: IntCounterVec,
	/// total number of gotify api requests
	requests: IntCounterVec,
	/// failed gotify api requests
	requests_failed: IntCounterVec,
	/// duration of gotify api requests
	request_duration: HistogramVec,
}

impl Metrics {
	fn new() -> Result<Self, prometheus::Error> {
		let received_alerts = register_int_counter_vec!(
			opts!("received_alerts", "total number of deserialized alerts")
				.namespace("am2gotify")
				.subsystem("alertmanager_webhook"),
			&["status"]
		)?;

		let messages = register_int_counter_vec!(
			opts!("messages_total", "gotify messages created or deleted")
				.namespace("am2gotify")
				.subsystem("gotify"),
			&["action"]
		)?;

		let requests = register_int_counter_vec!(
			opts!("http_requests_total", "total number of gotify api requests")
				.namespace("am2gotify")
				.subsystem("gotify"),
			&["operation"]
		)?;

		let requests_failed = register_int_counter_vec!(
			opts!("http_requests_failed", "number of failed gotify api requests")
				.namespace("am2gotify")
				.subsystem("gotify"),
			&["operation", "status_code"]
		)?;

		let request_duration = register_histogram_vec!(
			histogram_opts!(
				"http_request_duration_seconds",
				"total time of a gotify api request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("am2gotify")
			.subsystem("gotify"),
			&["operation"]
		)?;

		Ok(Self { received_alerts, messages, requests, requests_failed, request_duration })
	}

	pub(crate) fn global() -> &'static Self {
		&METRICS
	}

	pub(crate) fn record_received_alert(&self, status: Status) {
		self.received_alerts.with_label_values(&[status.as_str()]).inc();
	}

	pub(crate) fn record_created(&self) {
		self.messages.with_label_values(&["created"]).inc();
	}

	pub(crate) fn record_deleted(&self) {
		self.messages.with_label_values(&["deleted"]).inc();
	}

	pub(crate) fn record_delete_failed(&self) {
		self.messages.with_label_values(&["delete_failed"]).inc();
	}

	/// counts a request and times it until the returned timer is dropped
	pub(crate) fn start_request(&self, operation: &str) -> HistogramTimer {
		self.requests.with_label_values(&[operation]).inc();
		self.request_duration.with_label_values(&[operation]).start_timer()
	}

	/// counts a failed request, `status_code` is empty for transport errors
	pub(crate) fn record_request_failed(&self, operation: &str, status_code: &str) {
		self.requests_failed.with_label_values(&[operation, status_code]).inc();
	}
}
