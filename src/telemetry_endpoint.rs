//! Here we expose prometheus metrics about the relay
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryEndpointSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl TelemetryEndpointSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

async fn metrics_handler() -> Response {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => ([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer).into_response(),
        Err(err) => {
            tracing::error!("failed to encode metrics: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_telemetry_endpoint(settings: TelemetryEndpointSettings) -> Result<()> {
    let addr = settings.to_socket_addr();
    tracing::info!("telemetry endpoint listening on {}", addr);

    axum::Server::try_bind(&addr)
        .context(format!("can't bind telemetry endpoint to {addr}"))?
        .serve(router().into_make_service())
        .await
        .context("telemetry endpoint crashed")?;

    Ok(())
}
