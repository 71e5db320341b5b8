//! Outbound page fetches.
//!
//! A [`Fetcher`] performs exactly one HTTP GET with the identity chosen for
//! that attempt. Retrying is the caller's job.

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy};

use crate::config::{AppConfig, ProxyConfig, ScraperConfig, DEFAULT_USER_AGENTS};
use crate::utils::error::FetchError;

/// The user agent and proxy used for a single attempt. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchIdentity {
    pub user_agent: String,
    /// Proxy endpoint without credentials, kept for logging.
    pub proxy: Option<String>,
}

/// Pool of identities to rotate through, one random pick per attempt.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    user_agents: Vec<String>,
    proxy: Option<String>,
}

impl IdentityPool {
    pub fn new(user_agents: Vec<String>, proxy: Option<String>) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            user_agents
        };
        Self { user_agents, proxy }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.scraper.user_agents.clone(),
            config.proxy.as_ref().map(ProxyConfig::endpoint),
        )
    }

    pub fn choose(&self) -> FetchIdentity {
        let index = rand::rng().random_range(0..self.user_agents.len());
        FetchIdentity {
            user_agent: self.user_agents[index].clone(),
            proxy: self.proxy.clone(),
        }
    }

    pub fn user_agents(&self) -> &[String] {
        &self.user_agents
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw document at `url`.
    async fn fetch(&self, url: &str, identity: &FetchIdentity) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher. The proxy, when configured, applies to every request.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig, proxy: Option<&ProxyConfig>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .gzip(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(build_proxy(proxy)?);
            tracing::info!("Routing outbound fetches through proxy {}", proxy.endpoint());
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn build_proxy(config: &ProxyConfig) -> Result<Proxy, FetchError> {
    let proxy = Proxy::all(config.endpoint()).map_err(|e| FetchError::Proxy(e.to_string()))?;

    match (&config.username, &config.password) {
        (Some(username), Some(password)) => Ok(proxy.basic_auth(username, password)),
        (None, None) => Ok(proxy),
        _ => Err(FetchError::Proxy(
            "username and password must be set together".to_string(),
        )),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, identity: &FetchIdentity) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, identity.user_agent.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}
