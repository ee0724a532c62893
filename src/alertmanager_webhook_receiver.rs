//! Webhook endpoint for prometheus alertmanager.
//!
//! Every alert of a received batch is either forwarded to gotify, skipped or,
//! for resolved alerts in delete mode, used to remove the messages it caused.

use std::{future::Future, net::TcpListener, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    alert::{self, Alert, Status},
    gotify::{MessageSender, SinkError},
    idle::ActivityNotifier,
    metrics::Metrics,
    reconciler::Reconciler,
    translator,
};

/// What to do with resolved alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedPolicy {
    /// send a `[resolved]` message
    #[default]
    Notify,
    /// drop resolved alerts
    Ignore,
    /// delete the messages sent while the alert was firing
    Delete,
}

impl ResolvedPolicy {
    pub const VARIANTS: [&'static str; 3] = ["notify", "ignore", "delete"];
}

/// Per-run handling of resolved alerts. Holds the management handle only in
/// delete mode.
#[derive(Debug, Clone)]
pub enum ResolvedAction {
    Notify,
    Ignore,
    Delete(Reconciler),
}

/// Failure while handling a single alert
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("error sending gotify message: {0}")]
    Send(#[source] SinkError),
    #[error("error deleting gotify messages of resolved alert: {0}")]
    Reconcile(#[source] SinkError),
}

/// Shared state of the webhook receiver, built once at startup
pub struct Relay {
    sender: Arc<dyn MessageSender>,
    resolved: ResolvedAction,
    activity: Option<ActivityNotifier>,
}

impl Relay {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        resolved: ResolvedAction,
        activity: Option<ActivityNotifier>,
    ) -> Self {
        Self { sender, resolved, activity }
    }

    async fn handle_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        match (alert.status, &self.resolved) {
            (Status::Resolved, ResolvedAction::Ignore) => Ok(()),
            (Status::Resolved, ResolvedAction::Delete(reconciler)) => {
                reconciler.reconcile(alert).await.map(|_| ()).map_err(AlertError::Reconcile)
            }
            _ => translator::translate_and_send(self.sender.as_ref(), alert)
                .await
                .map_err(AlertError::Send),
        }
    }

    /// Handles all alerts of the batch in order. A failing alert doesn't stop
    /// the remaining ones; the last failure is returned.
    pub async fn handle_batch(&self, data: &alert::Data) -> Result<(), AlertError> {
        let metrics = Metrics::global();
        let mut last_err = None;

        for alert in &data.alerts {
            metrics.record_received_alert(alert.status);

            if let Err(err) = self.handle_alert(alert).await {
                tracing::warn!(fingerprint = alert.fingerprint.as_str(), "{}", err);
                last_err = Some(err);
            }
        }

        last_err.map_or(Ok(()), Err)
    }
}

async fn prometheus_receiver(Extension(relay): Extension<Arc<Relay>>, body: Bytes) -> Response {
    let _activity = relay.activity.as_ref().map(ActivityNotifier::guard);

    // only the first json value counts, trailing bytes are ignored
    let mut de = serde_json::Deserializer::from_slice(&body);
    let data = match alert::Data::deserialize(&mut de) {
        Ok(data) => data,
        Err(err) => {
            tracing::debug!("failed to deserialize alert: {:?}", err);
            return (
                StatusCode::BAD_REQUEST,
                format!("error decoding alertmanager webhook payload: {err}"),
            )
                .into_response();
        }
    };

    tracing::debug!(
        receiver = data.receiver.as_str(),
        group_key = data.group_key.as_str(),
        status = data.status.as_str(),
        "received {} alerts",
        data.alerts.len()
    );
    if data.truncated_alerts > 0 {
        tracing::warn!("alertmanager truncated {} alerts of this group", data.truncated_alerts);
    }

    match relay.handle_batch(&data).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Router accepting alert batches with any method on any path
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .fallback(any(prometheus_receiver))
        .layer(Extension(relay))
}

/// Serves the webhook receiver on `listener` until `shutdown` resolves.
/// Open connections stop being kept alive and are drained once `shutdown`
/// resolved.
pub async fn run_prometheus_receiver(
    listener: TcpListener,
    relay: Arc<Relay>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    tracing::info!("alertmanager webhook receiver listening on {}", addr);

    axum::Server::from_tcp(listener)
        .context("can't serve on listener")?
        .serve(router(relay).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("alertmanager webhook receiver crashed")?;

    Ok(())
}
