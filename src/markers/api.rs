use reqwest::Client as HttpClient;
use tracing::debug;
use url::Url;

use crate::markers::model::{Marker, MarkerId};
use crate::utils::MarkerError;

/// Client for the marker REST API under `{base}/api/markers`.
#[derive(Debug, Clone)]
pub struct MarkerApi {
    http: HttpClient,
    base: Url,
}

impl MarkerApi {
    pub fn new(base_url: &str) -> Result<Self, MarkerError> {
        Self::with_client(HttpClient::new(), base_url)
    }

    pub fn with_client(http: HttpClient, base_url: &str) -> Result<Self, MarkerError> {
        let mut base = Url::parse(base_url)?;
        // keep a trailing slash so joins append instead of replacing the last segment
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    pub fn markers_url(&self, tail: &str) -> Result<Url, MarkerError> {
        Ok(self.base.join(&format!("api/markers/{tail}"))?)
    }

    pub fn audio_url(&self, id: MarkerId) -> Result<Url, MarkerError> {
        self.markers_url(&format!("audio/{id}"))
    }

    pub async fn fetch_all(&self) -> Result<Vec<Marker>, MarkerError> {
        let url = self.markers_url("all")?;
        debug!("GET {url}");
        let markers = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(markers)
    }

    pub async fn fetch(&self, id: MarkerId) -> Result<Marker, MarkerError> {
        let url = self.markers_url(&id.to_string())?;
        debug!("GET {url}");
        let marker = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(marker)
    }

    pub async fn edit(&self, marker: &Marker) -> Result<(), MarkerError> {
        let url = self.markers_url("edit")?;
        debug!("PUT {url}");
        self.http
            .put(url)
            .json(marker)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
