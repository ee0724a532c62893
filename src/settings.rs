use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

use crate::{
    alertmanager_webhook_receiver::ResolvedPolicy, gotify::GotifySettings, log::LogSettings,
    telemetry_endpoint::TelemetryEndpointSettings,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// command line flags and the config keys they override
const OVERRIDES: [(&str, &str); 6] = [
    ("url", "gotify.url"),
    ("token", "gotify.token"),
    ("ctoken", "gotify.client_token"),
    ("resolved", "resolved"),
    ("exitafter", "exit_after"),
    ("level", "log.level"),
];

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub gotify: GotifySettings,
    #[serde(default)]
    pub resolved: ResolvedPolicy,
    /// exit after being idle this long, zero to stay up forever
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default)]
    pub exit_after: Duration,
    /// bind the webhook receiver here instead of using socket activation
    #[serde(default)]
    pub bind_address: Option<SocketAddr>,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub telemetry_endpoint: Option<TelemetryEndpointSettings>,
}

impl Settings {
    pub fn global() -> &'static Self {
        SETTINGS.get_or_init(|| {
            match Self::load().context("failed to load config and command line arguments") {
                Ok(settings) => settings,
                Err(err) => {
                    // tracing wasn't setup yet
                    panic!("{:#?}", err);
                }
            }
        })
    }

    fn command() -> Command<'static> {
        Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args([
                Arg::new("config")
                    .help("path of config file")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("url").help("gotify server url").takes_value(true).long("url"),
                Arg::new("token")
                    .help("gotify application token")
                    .takes_value(true)
                    .long("token"),
                Arg::new("ctoken")
                    .help("gotify client token, required for --resolved=delete")
                    .takes_value(true)
                    .long("ctoken"),
                Arg::new("resolved")
                    .help("behavior for resolved alerts")
                    .possible_values(ResolvedPolicy::VARIANTS)
                    .takes_value(true)
                    .long("resolved"),
                Arg::new("exitafter")
                    .help("seconds to wait before quitting after handling a request, 0 to stay up forever")
                    .validator(|v| v.parse::<u64>())
                    .takes_value(true)
                    .long("exitafter"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
    }

    fn load() -> Result<Self> {
        Self::from_matches(&Self::command().get_matches())
    }

    /// config file < environment (`AM2GOTIFY_GOTIFY__URL`, ...) < command line
    fn from_matches(opts: &ArgMatches) -> Result<Self> {
        let config_path = opts.value_of("config").unwrap_or("./config.yaml");

        let mut builder = Config::builder()
            .add_source(
                config::File::with_name(config_path).required(opts.occurrences_of("config") > 0),
            )
            .add_source(Environment::with_prefix("AM2GOTIFY").prefix_separator("_").separator("__"));

        for (flag, key) in OVERRIDES {
            if let Some(value) = opts.value_of(flag) {
                builder = builder.set_override(key, value).context("can't load config")?;
            }
        }

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .context("can't load config")?
            .try_deserialize()
            .context("can't load config")?;

        if settings.resolved == ResolvedPolicy::Delete && settings.gotify.client_token.is_none() {
            bail!("resolved=delete requires a gotify client token (--ctoken)");
        }

        Ok(settings)
    }
}
