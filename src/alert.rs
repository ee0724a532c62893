//! data structures for deserializing incoming alerts
use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
/// data from prometheus received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct Data {
	pub group_key: String,
	/// number of alerts alertmanager dropped because of `max_alerts`
	pub truncated_alerts: u64,

	pub receiver: String,
	pub status: String,
	pub alerts: Vec<Alert>,
}

/// lifecycle state of a single alert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Firing,
	Resolved,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Firing => "firing",
			Status::Resolved => "resolved",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	pub status: Status,
	#[serde(default)]
	pub labels: HashMap<String, String>,
	#[serde(default)]
	pub annotations: HashMap<String, String>,
	#[serde(default)]
	pub starts_at: Option<DateTime<Utc>>,
	/// stable across the firing and resolved notifications of the same alert
	#[serde(default)]
	pub fingerprint: String,
}

impl Alert {
	/// label value, empty if the label is missing
	pub fn label(&self, key: &str) -> &str {
		self.labels.get(key).map(String::as_str).unwrap_or_default()
	}

	/// annotation value, empty if the annotation is missing
	pub fn annotation(&self, key: &str) -> &str {
		self.annotations.get(key).map(String::as_str).unwrap_or_default()
	}
}
