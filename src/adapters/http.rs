use crate::domain::model::{Kpis, ListingPage};
use crate::domain::ports::{ConfigProvider, DashboardApi};
use crate::utils::error::{status_error, AuthSource, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// REST client for one dashboard's metrics and listings endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    metrics_url: String,
    listings_url: String,
    cookie: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, metrics_path: &str, listings_path: &str) -> Result<Self> {
        Self::with_timeout(base_url, metrics_path, listings_path, Duration::from_secs(10))
    }

    pub fn with_timeout(
        base_url: &str,
        metrics_path: &str,
        listings_path: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = base_url.trim_end_matches('/');

        Ok(Self {
            client,
            metrics_url: format!("{}{}", base, metrics_path),
            listings_url: format!("{}{}", base, listings_path),
            cookie: None,
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C, timeout: Duration) -> Result<Self> {
        Ok(Self::with_timeout(
            config.base_url(),
            config.metrics_path(),
            config.listings_path(),
            timeout,
        )?
        .with_cookie(config.cookie().map(str::to_string)))
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, source: AuthSource) -> Result<T> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url).header(header::ACCEPT, "application/json");
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            return Err(status_error(status, url, source));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn fetch_kpis(&self) -> Result<Kpis> {
        self.get_json(&self.metrics_url, AuthSource::Metrics).await
    }

    async fn fetch_listings(&self) -> Result<ListingPage> {
        self.get_json(&self.listings_url, AuthSource::Listings).await
    }
}
