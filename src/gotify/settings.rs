//! config file options for the gotify connection

use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
/// gotify server and credentials
pub struct GotifySettings {
	/// base url of the gotify server
	pub url: Url,
	/// application token, used for sending messages
	pub token: String,
	/// client token, used for listing and deleting messages
	#[serde(default)]
	pub client_token: Option<String>,
	/// timeout of a single api request
	#[serde_as(as = "DurationSeconds<u64>")]
	#[serde(default = "default_timeout")]
	pub timeout: Duration,
}

fn default_timeout() -> Duration {
	Duration::from_secs(10)
}
