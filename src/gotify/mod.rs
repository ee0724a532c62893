//! Gotify server access.
//!
//! The relay talks to gotify with two different credentials: the application
//! token may only create messages, the client token may list and delete them.
//! Both scopes are modelled as separate traits so that the send path never
//! needs the management credential.

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::{
    client::GotifyClient,
    settings::GotifySettings,
};

mod client;
mod settings;
#[cfg(test)]
pub(crate) mod stub;

/// extras key holding the fingerprint of the alert a message was created for
pub const FINGERPRINT_KEY: &str = "am2gotify/fp";
/// extras key holding the level (severity or `resolved`) of the message
pub const LEVEL_KEY: &str = "am2gotify/level";

/// Error returned by any gotify api call
#[derive(Error, Debug)]
pub enum SinkError {
    /// request could not be sent or the response could not be read
    #[error("gotify request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// gotify answered with a non success status
    #[error("gotify returned {status}: {message}")]
    Api { status: StatusCode, message: String },
    /// url could not be constructed from the configured base url
    #[error("invalid gotify url: {0}")]
    Url(#[from] url::ParseError),
}

/// numeric id of the gotify application this relay sends as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// message body of `POST /message`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub title: String,
    #[serde(rename = "message")]
    pub body: String,
    pub priority: i64,
    pub extras: HashMap<String, serde_json::Value>,
}

impl OutboundMessage {
    /// fingerprint stored in the extras, if any
    pub fn fingerprint(&self) -> Option<&str> {
        self.extras.get(FINGERPRINT_KEY).and_then(serde_json::Value::as_str)
    }
}

/// read only view of a message held by gotify
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SinkMessage {
    pub id: u64,
    #[serde(default)]
    pub extras: Option<HashMap<String, serde_json::Value>>,
}

impl SinkMessage {
    /// true if the message was created for an alert with the given fingerprint
    pub fn has_fingerprint(&self, fingerprint: &str) -> bool {
        self.extras
            .as_ref()
            .and_then(|extras| extras.get(FINGERPRINT_KEY))
            .and_then(serde_json::Value::as_str)
            .map_or(false, |fp| fp == fingerprint)
    }
}

/// entry of `GET /application`
#[derive(Debug, Clone, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub token: String,
    #[serde(default)]
    pub name: String,
}

/// response of `GET /version`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub build_date: String,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (commit {}, built {})", self.version, self.commit, self.build_date)
    }
}

/// capability to create messages, requires the application token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn create_message(&self, message: &OutboundMessage) -> Result<(), SinkError>;
}

/// capability to inspect and delete messages, requires a client token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageManager: Send + Sync {
    /// all messages of the application, newest first
    async fn list_messages(&self, app_id: ApplicationId) -> Result<Vec<SinkMessage>, SinkError>;

    async fn delete_message(&self, id: u64) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn outbound_message_wire_format() {
        let message = OutboundMessage {
            title: "[firing] disk full".to_owned(),
            body: "node1: / is at 99%".to_owned(),
            priority: 8,
            extras: HashMap::from([(FINGERPRINT_KEY.to_owned(), json!("abc"))]),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "title": "[firing] disk full",
                "message": "node1: / is at 99%",
                "priority": 8,
                "extras": {"am2gotify/fp": "abc"},
            })
        );
        assert_eq!(message.fingerprint(), Some("abc"));
    }

    #[test]
    fn sink_message_fingerprint_matching() {
        let messages: Vec<SinkMessage> = serde_json::from_value(json!([
            {"id": 1, "appid": 3, "message": "x", "extras": {"am2gotify/fp": "abc"}},
            {"id": 2, "appid": 3, "message": "y", "extras": {"am2gotify/fp": 42}},
            {"id": 3, "appid": 3, "message": "z", "extras": {"other": "abc"}},
            {"id": 4, "appid": 3, "message": "w"},
        ]))
        .unwrap();

        let matching: Vec<u64> =
            messages.iter().filter(|m| m.has_fingerprint("abc")).map(|m| m.id).collect();

        assert_eq!(matching, vec![1]);
    }
}
