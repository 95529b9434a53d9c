use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub hub: HubSettings,
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub log: LogSettings,
}

/// Configuration for the real-time hub connection.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub url: String,
    pub skip_negotiation: bool,
    pub access_token: Option<String>,
    pub keep_alive_interval_secs: u64,
    pub server_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl HubSettings {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Configuration for the marker REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
}

/// Where the marker snapshot is kept. `None` disables the on-disk cache.
///
/// With `max_age_secs` set, entries older than that are dropped on load.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub path: Option<String>,
    pub max_age_secs: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub hub: Option<PartialHubSettings>,
    pub api: Option<PartialApiSettings>,
    pub cache: Option<PartialCacheSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHubSettings {
    pub url: Option<String>,
    pub skip_negotiation: Option<bool>,
    pub access_token: Option<String>,
    pub keep_alive_interval_secs: Option<u64>,
    pub server_timeout_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialApiSettings {
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialCacheSettings {
    pub path: Option<String>,
    pub enabled: Option<bool>,
    pub max_age_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hub: HubSettings {
                url: "http://192.168.0.169:5005/update".to_string(),
                skip_negotiation: false,
                access_token: None,
                keep_alive_interval_secs: 15,
                server_timeout_secs: 30,
                handshake_timeout_secs: 15,
                connect_timeout_secs: 15,
            },
            api: ApiSettings {
                base_url: "http://192.168.0.169:5005".to_string(),
            },
            cache: CacheSettings {
                path: Some("marker_cache".to_string()),
                max_age_secs: None,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
