mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{ApiSettings, CacheSettings, HubSettings, LogSettings, Settings};

/// Prefix for environment overrides, e.g. `MARKERHUB_HUB__URL`.
pub const ENV_PREFIX: &str = "MARKERHUB";

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the given file (any extension `config`
/// understands, optional) and environment variables, merged over the
/// defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    let hub = partial.hub.as_ref();
    let cache = partial.cache.as_ref();

    Ok(Settings {
        hub: HubSettings {
            url: hub
                .and_then(|h| h.url.clone())
                .unwrap_or(default.hub.url),
            skip_negotiation: hub
                .and_then(|h| h.skip_negotiation)
                .unwrap_or(default.hub.skip_negotiation),
            access_token: hub
                .and_then(|h| h.access_token.clone())
                .or(default.hub.access_token),
            keep_alive_interval_secs: hub
                .and_then(|h| h.keep_alive_interval_secs)
                .unwrap_or(default.hub.keep_alive_interval_secs),
            server_timeout_secs: hub
                .and_then(|h| h.server_timeout_secs)
                .unwrap_or(default.hub.server_timeout_secs),
            handshake_timeout_secs: hub
                .and_then(|h| h.handshake_timeout_secs)
                .unwrap_or(default.hub.handshake_timeout_secs),
            connect_timeout_secs: hub
                .and_then(|h| h.connect_timeout_secs)
                .unwrap_or(default.hub.connect_timeout_secs),
        },
        api: ApiSettings {
            base_url: partial
                .api
                .as_ref()
                .and_then(|a| a.base_url.clone())
                .unwrap_or(default.api.base_url),
        },
        cache: CacheSettings {
            path: match cache.and_then(|c| c.enabled) {
                Some(false) => None,
                _ => cache.and_then(|c| c.path.clone()).or(default.cache.path),
            },
            max_age_secs: cache
                .and_then(|c| c.max_age_secs)
                .or(default.cache.max_age_secs),
        },
        log: LogSettings {
            level: partial
                .log
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    })
}
