//! Configuration file parser for `bookfeed.toml`.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Placeholder substituted with the book identifier in `detail_url_template`.
pub const DETAIL_ID_PLACEHOLDER: &str = "{id}";

/// Environment variable that overrides the listening port.
pub const PORT_ENV: &str = "PORT";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed fine but cannot be used.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface the feed server binds to.
    pub listen_host: String,

    /// Port the feed server binds to. `PORT` overrides it.
    pub port: u16,

    /// Last path segment of the feed route (`/feeds/<feed_name>`).
    pub feed_name: String,

    /// Location of the published Atom document.
    pub artifact_path: PathBuf,

    /// Append-only diagnostic log.
    pub log_file: PathBuf,

    /// Seconds between refresh cycles.
    pub refresh_interval_secs: u64,

    /// Seconds in-flight requests get to finish after a termination signal.
    pub shutdown_grace_secs: u64,

    /// Catalog endpoint polled by the refresh loop.
    pub upstream_url: String,

    /// Number of entries requested per fetch.
    pub page_size: u32,

    /// Overall timeout for one upstream request.
    pub request_timeout_secs: u64,

    pub feed_title: String,
    pub feed_link: String,
    pub feed_description: String,

    /// Book detail page; `{id}` is replaced with the book identifier.
    pub detail_url_template: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            port: 8080,
            feed_name: "dedao.atom".to_string(),
            artifact_path: PathBuf::from("dedao.atom"),
            log_file: PathBuf::from("app.log"),
            refresh_interval_secs: 2 * 60 * 60,
            shutdown_grace_secs: 5,
            upstream_url: "https://m.igetget.com/native/api/ebook/getBookList".to_string(),
            page_size: 50,
            request_timeout_secs: 30,
            feed_title: "得到最新电子书 Atom 订阅源".to_string(),
            feed_link: "https://m.igetget.com/native/ebook/#/ebook/newBookList".to_string(),
            feed_description: "得到最新电子书更新".to_string(),
            detail_url_template: "https://www.dedao.cn/ebook/detail?id={id}".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 14] = [
        "listen_host",
        "port",
        "feed_name",
        "artifact_path",
        "log_file",
        "refresh_interval_secs",
        "shutdown_grace_secs",
        "upstream_url",
        "page_size",
        "request_timeout_secs",
        "feed_title",
        "feed_link",
        "feed_description",
        "detail_url_template",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    ///
    /// The result is not validated; call [`Config::validate`] once all
    /// overrides have been applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), feed = %config.feed_name, "Loaded configuration");
        Ok(config)
    }

    /// Apply the value of the `PORT` environment variable, if any.
    ///
    /// Empty values are ignored, matching an unset variable.
    pub fn apply_port_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        self.port = raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV}={raw:?} is not a valid port")))?;
        Ok(())
    }

    /// Reject values that parse but would break the service at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be greater than 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.feed_name.is_empty() || self.feed_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "feed_name {:?} must be a single non-empty path segment",
                self.feed_name
            )));
        }
        if !self.detail_url_template.contains(DETAIL_ID_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "detail_url_template must contain {DETAIL_ID_PLACEHOLDER}"
            )));
        }
        let upstream = url::Url::parse(&self.upstream_url)
            .map_err(|e| ConfigError::Invalid(format!("upstream_url: {e}")))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "upstream_url scheme {:?} not supported (only http/https)",
                upstream.scheme()
            )));
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.listen_host.trim_start_matches('[').trim_end_matches(']');
        let ip = host
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("listen_host {host:?} is not an IP address")))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Route served by the feed server, e.g. `/feeds/dedao.atom`.
    pub fn feed_route(&self) -> String {
        format!("/feeds/{}", self.feed_name)
    }
}

// ============================================================================
// Tests
// ============================================================================
