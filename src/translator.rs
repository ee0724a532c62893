//! Translates alertmanager alerts into gotify messages.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    alert::{Alert, Status},
    gotify::{MessageSender, OutboundMessage, SinkError, FINGERPRINT_KEY, LEVEL_KEY},
    metrics::Metrics,
};

/// priority used if the alert has no usable `p` label
pub const DEFAULT_PRIORITY: i64 = 5;

/// level of firing alerts without a `severity` label
pub const DEFAULT_LEVEL: &str = "warning";

/// Level of the message: the severity for firing alerts, `resolved` otherwise
pub fn level(alert: &Alert) -> &str {
    match alert.status {
        Status::Resolved => "resolved",
        Status::Firing => match alert.label("severity") {
            "" => DEFAULT_LEVEL,
            severity => severity,
        },
    }
}

/// Priority from the `p` label, [DEFAULT_PRIORITY] if it's missing or not an integer
pub fn priority(alert: &Alert) -> i64 {
    alert.label("p").parse().unwrap_or(DEFAULT_PRIORITY)
}

pub fn translate(alert: &Alert) -> OutboundMessage {
    let title = format!("[{}] {}", alert.status, alert.annotation("summary"));

    let body = match alert.label("instance") {
        "" => alert.annotation("description").to_owned(),
        instance => format!("{instance}: {}", alert.annotation("description")),
    };

    let extras = HashMap::from([
        (FINGERPRINT_KEY.to_owned(), Value::from(alert.fingerprint.as_str())),
        (LEVEL_KEY.to_owned(), Value::from(level(alert))),
    ]);

    OutboundMessage { title, body, priority: priority(alert), extras }
}

/// Translates the alert and creates the message on gotify. Errors are not retried.
pub async fn translate_and_send(
    sender: &dyn MessageSender,
    alert: &Alert,
) -> Result<(), SinkError> {
    let message = translate(alert);

    tracing::debug!(
        fingerprint = ?message.fingerprint(),
        starts_at = ?alert.starts_at,
        level = level(alert),
        priority = message.priority,
        "sending message {:?}",
        message.title
    );

    sender.create_message(&message).await?;
    Metrics::global().record_created();

    Ok(())
}
