//! Connection negotiation
//!
//! Before opening the socket the client asks the server which transports it
//! offers and obtains a connection token. The server may instead redirect the
//! client to another endpoint (with its own access token), which is followed
//! up to `MAX_REDIRECTS` times.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::utils::HubError;

pub const MAX_REDIRECTS: usize = 100;
pub const WEBSOCKETS_TRANSPORT: &str = "WebSockets";
pub const TEXT_TRANSFER_FORMAT: &str = "Text";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub connection_id: Option<String>,
    pub connection_token: Option<String>,
    #[serde(default)]
    pub negotiate_version: u32,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    pub url: Option<String>,
    pub access_token: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Endpoint to open the socket against (after any redirects).
    pub url: Url,
    pub connection_id: Option<String>,
    pub connection_token: Option<String>,
    pub access_token: Option<String>,
}

impl NegotiateResponse {
    pub fn supports_websockets(&self) -> bool {
        self.available_transports.iter().any(|t| {
            t.transport == WEBSOCKETS_TRANSPORT
                && t.transfer_formats.iter().any(|f| f == TEXT_TRANSFER_FORMAT)
        })
    }

    /// Version 0 servers only hand out a connection id, which doubles as the token.
    pub fn token(&self) -> Option<&str> {
        if self.negotiate_version >= 1 {
            self.connection_token.as_deref()
        } else {
            self.connection_id.as_deref()
        }
    }
}

pub fn parse_hub_url(raw: &str) -> Result<Url, HubError> {
    let url = Url::parse(raw).map_err(|e| HubError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(url),
        other => Err(HubError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

/// `{hub}/negotiate?negotiateVersion=1`, keeping any existing query.
pub fn negotiate_url(hub: &Url) -> Url {
    let mut url = hub.clone();
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{path}/negotiate"));
    url.set_fragment(None);
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    url
}

/// Maps the hub endpoint onto its WebSocket URL and appends the connection
/// token as the `id` query parameter.
pub fn websocket_url(hub: &Url, connection_token: Option<&str>) -> Result<Url, HubError> {
    let mut url = hub.clone();
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HubError::InvalidUrl {
                url: hub.to_string(),
                reason: format!("unsupported scheme {other}"),
            });
        }
    };
    url.set_scheme(scheme).map_err(|_| HubError::InvalidUrl {
        url: hub.to_string(),
        reason: format!("cannot switch scheme to {scheme}"),
    })?;
    url.set_fragment(None);
    if let Some(token) = connection_token {
        url.query_pairs_mut().append_pair("id", token);
    }
    Ok(url)
}

pub async fn negotiate(
    http: &HttpClient,
    hub: &Url,
    access_token: Option<&str>,
) -> Result<Negotiated, HubError> {
    let mut url = hub.clone();
    let mut access_token = access_token.map(str::to_string);

    for _ in 0..=MAX_REDIRECTS {
        let endpoint = negotiate_url(&url);
        debug!("Negotiating with {endpoint}");

        let mut request = http.post(endpoint);
        if let Some(token) = &access_token {
            request = request.bearer_auth(token);
        }
        let response: NegotiateResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = &response.error {
            return Err(HubError::Negotiate(error.clone()));
        }

        if let Some(redirect) = &response.url {
            debug!("Negotiation redirected to {redirect}");
            url = parse_hub_url(redirect)?;
            if response.access_token.is_some() {
                access_token = response.access_token.clone();
            }
            continue;
        }

        if !response.supports_websockets() {
            return Err(HubError::NoWebSocketTransport);
        }

        return Ok(Negotiated {
            connection_token: response.token().map(str::to_string),
            connection_id: response.connection_id.clone(),
            url,
            access_token,
        });
    }

    Err(HubError::TooManyRedirects(MAX_REDIRECTS))
}
