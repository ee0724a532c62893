//! prometheus alertmanager receiver that forwards alerts to a gotify server
//!
//! Features:
//! - one gotify message per alert, title, body and priority taken from the alert
//! - resolved alerts can be forwarded, ignored or delete the messages of the
//!   alert they resolve
//! - socket activation and exiting after being idle for a while

use std::{net::TcpListener, sync::Arc, time::Duration};

use alertmanager_webhook_receiver::{Relay, ResolvedAction, ResolvedPolicy};
use anyhow::{Context, Result};
use gotify::{GotifyClient, GotifySettings};
use idle::IdleScheduler;
use reconciler::Reconciler;
use settings::Settings;
use tokio::{sync::oneshot, time};

mod alert;
mod alertmanager_webhook_receiver;
mod gotify;
mod idle;
mod listener;
mod log;
mod metrics;
mod reconciler;
mod settings;
mod telemetry_endpoint;
mod translator;

/// time open connections get to finish after the relay became idle
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// Checks that gotify is reachable and sets up the handling of resolved
/// alerts. In delete mode this looks up the id of the application the
/// configured token belongs to.
async fn connect(
	settings: &GotifySettings,
	policy: ResolvedPolicy,
) -> Result<(GotifyClient, ResolvedAction)> {
	let gotify = GotifyClient::new(settings).context("invalid gotify settings")?;

	let version = gotify.version().await.context("could not request gotify version")?;
	tracing::info!("gotify version: {}", version);

	let resolved = match policy {
		ResolvedPolicy::Notify => ResolvedAction::Notify,
		ResolvedPolicy::Ignore => ResolvedAction::Ignore,
		ResolvedPolicy::Delete => {
			let client_token = settings
				.client_token
				.as_deref()
				.context("for --resolved=delete: no client token configured")?;
			let management = gotify.management(client_token);

			let app = management
				.find_application(&settings.token)
				.await
				.context("for --resolved=delete: unable to retrieve app list, did you provide a valid --ctoken?")?
				.context("for --resolved=delete: could not find application matching provided --token")?;
			tracing::info!("for --resolved=delete: app ID is {} ({})", app.id, app.name);

			ResolvedAction::Delete(Reconciler::new(Arc::new(management), app.id))
		}
	};

	Ok((gotify, resolved))
}

/// Serves alerts until the idle scheduler expires. Without a scheduler this
/// only returns if the server fails.
async fn serve(listener: TcpListener, relay: Arc<Relay>, idle: Option<IdleScheduler>) -> Result<()> {
	let (tx_drain, rx_drain) = oneshot::channel();

	let expired = idle.map(|idle| tokio::spawn(idle.expired()));
	let shutdown = async move {
		match expired {
			Some(expired) => {
				if let Err(err) = expired.await {
					tracing::error!("idle scheduler failed: {}", err);
				}
			}
			None => std::future::pending().await,
		}
		let _ = tx_drain.send(());
	};

	let server = alertmanager_webhook_receiver::run_prometheus_receiver(listener, relay, shutdown);
	tokio::pin!(server);

	tokio::select! {
		res = &mut server => return res,
		Ok(()) = rx_drain => {}
	}

	match time::timeout(DRAIN_TIMEOUT, &mut server).await {
		Ok(res) => res,
		Err(_) => {
			tracing::error!("cannot gracefully shut down within {:?}", DRAIN_TIMEOUT);
			std::process::abort();
		}
	}
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::global();

	log::setup_logging().context("could not setup logging")?;

	let (gotify, resolved) = connect(&settings.gotify, settings.resolved).await?;

	let listener = listener::acquire(settings.bind_address).context("cannot retrieve listener")?;

	if let Some(telemetry) = settings.telemetry_endpoint.clone() {
		tokio::spawn(async move {
			if let Err(err) = telemetry_endpoint::run_telemetry_endpoint(telemetry).await {
				tracing::error!("{:#}", err);
			}
		});
	}

	let (idle, activity) = if settings.exit_after.is_zero() {
		(None, None)
	} else {
		let (idle, activity) = IdleScheduler::new(settings.exit_after);
		(Some(idle), Some(activity))
	};

	let relay = Relay::new(Arc::new(gotify.app(settings.gotify.token.as_str())), resolved, activity);

	serve(listener, Arc::new(relay), idle).await?;

	tracing::info!("shut down");

	Ok(())
}
