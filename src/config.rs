use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::models::Source;
use crate::plugins::parsers::SelectorProfile;
use crate::scheduler::BatchScheduler;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Per-source selector overrides keyed by lowercase source name.
    #[serde(default)]
    pub selectors: HashMap<String, SelectorProfile>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub max_concurrent_checks: usize,
    pub retry_attempts: u32,
    pub base_delay_ms: u64,
    pub connect_timeout: u64,
    pub request_timeout: u64,
    pub user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    /// `host:port` of the upstream proxy.
    pub host: String,
    #[serde(default = "default_proxy_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron: String,
    pub batch_timeout: u64,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Firefox/126.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/125.0.0.0",
];

fn default_proxy_scheme() -> String {
    "http".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/listings.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 8,
            retry_attempts: 3,
            base_delay_ms: 2000,
            connect_timeout: 5,
            request_timeout: 15,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */6 * * *".to_string(),
            batch_timeout: 900,
            run_on_start: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "listing-watcher.log".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl ScraperConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl SchedulerConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout)
    }
}

impl ProxyConfig {
    /// Proxy URL without credentials; safe to log.
    pub fn endpoint(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        Self::finish(s.try_deserialize()?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        Self::finish(s.try_deserialize()?)
    }

    fn finish(mut config: AppConfig) -> Result<Self, ConfigError> {
        // Proxy credentials usually live in the environment, not in files
        if let Some(proxy) = config.proxy.as_mut() {
            if proxy.username.is_none() {
                proxy.username = env::var("PROXY_USERNAME").ok();
            }
            if proxy.password.is_none() {
                proxy.password = env::var("PROXY_PASSWORD").ok();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.scraper.max_concurrent_checks == 0 {
            return Err(ConfigError::Message("Scraper max_concurrent_checks must be greater than 0".into()));
        }

        if self.scraper.retry_attempts == 0 {
            return Err(ConfigError::Message("Scraper retry_attempts must be greater than 0".into()));
        }

        if self.scraper.connect_timeout == 0 || self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper timeouts must be greater than 0".into()));
        }

        if self.scraper.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Message("Scraper user_agents must contain at least one entry".into()));
        }

        if let Some(proxy) = &self.proxy {
            if Url::parse(&proxy.endpoint()).is_err() || proxy.host.is_empty() {
                return Err(ConfigError::Message(format!("Invalid proxy host: {}", proxy.host)));
            }
            if proxy.username.is_some() != proxy.password.is_some() {
                return Err(ConfigError::Message("Proxy username and password must be set together".into()));
            }
        }

        if !BatchScheduler::validate_cron_expression(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        if self.scheduler.batch_timeout == 0 {
            return Err(ConfigError::Message("Scheduler batch_timeout must be greater than 0".into()));
        }

        for (key, profile) in &self.selectors {
            if key.parse::<Source>().is_err() {
                return Err(ConfigError::Message(format!("Selectors configured for unknown source: {}", key)));
            }
            if profile.title.is_empty() || (profile.price.is_empty() && profile.price_whole.is_empty()) {
                return Err(ConfigError::Message(format!(
                    "Selectors for {} need title and price candidates",
                    key
                )));
            }
        }

        Ok(())
    }
}
