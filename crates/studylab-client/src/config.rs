//! Configuration for the chat client.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use url::Url;

use crate::{Error, Result};

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default timeout for non-streaming requests: 30 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of restarts for [`chat_stream_with_retry`].
///
/// [`chat_stream_with_retry`]: crate::ChatClient::chat_stream_with_retry
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between stream restarts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for [`ChatClient`].
///
/// [`ChatClient`]: crate::ChatClient
#[derive(Debug, Clone)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ClientConfig {
    /// Base URL of the chat server.
    #[cfg_attr(
        feature = "config",
        arg(long = "api-url", env = "STUDYLAB_API_URL", default_value = DEFAULT_BASE_URL)
    )]
    pub base_url: String,

    /// Timeout for non-streaming requests.
    ///
    /// Streams are not bounded by this timeout since a turn may take minutes.
    #[cfg_attr(
        feature = "config",
        arg(long = "api-timeout", env = "STUDYLAB_API_TIMEOUT", default_value = "30s", value_parser = parse_duration)
    )]
    pub timeout: Duration,

    /// User-Agent header to send with requests.
    #[cfg_attr(feature = "config", arg(skip = default_user_agent()))]
    pub user_agent: String,

    /// Number of times a failed stream is restarted.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "STUDYLAB_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)
    )]
    pub max_retries: u32,

    /// Base delay between restarts, multiplied by the attempt number.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "STUDYLAB_RETRY_DELAY", default_value = "1s", value_parser = parse_duration)
    )]
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Returns the default user agent string.
fn default_user_agent() -> String {
    format!("studylab-client/{}", env!("CARGO_PKG_VERSION"))
}

/// Parses `"250ms"`, `"2s"` or a bare number of seconds.
#[cfg(feature = "config")]
fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let value = value.trim();
    let (number, unit) = match value.strip_suffix("ms") {
        Some(number) => (number, 1),
        None => (value.strip_suffix('s').unwrap_or(value), 1000),
    };

    number
        .trim()
        .parse::<u64>()
        .map(|n| Duration::from_millis(n * unit))
        .map_err(|_| format!("invalid duration: {value}"))
}

impl ClientConfig {
    /// Creates a configuration pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Returns the effective timeout, using default if zero.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Returns the effective user agent, using default if empty.
    pub fn effective_user_agent(&self) -> String {
        if self.user_agent.is_empty() {
            default_user_agent()
        } else {
            self.user_agent.clone()
        }
    }

    /// Parses the base URL, ensuring it ends with a slash so joins keep its path.
    pub fn base_url(&self) -> Result<Url> {
        let mut base = self.base_url.trim().to_owned();
        if !base.ends_with('/') {
            base.push('/');
        }

        let url = Url::parse(&base).map_err(|e| Error::config(format!("invalid base url: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::config(format!("unsupported url scheme: {scheme}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert!(config.user_agent.contains("studylab"));
    }

    #[test]
    fn effective_values_fall_back_to_defaults() {
        let config = ClientConfig {
            timeout: Duration::ZERO,
            user_agent: String::new(),
            ..Default::default()
        };
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
        assert!(config.effective_user_agent().contains("studylab"));
    }

    #[test]
    fn base_url_keeps_path_prefix() -> anyhow::Result<()> {
        let url = ClientConfig::new("http://example.com/api").base_url()?;
        assert_eq!(url.join("chat/stream")?.as_str(), "http://example.com/api/chat/stream");
        Ok(())
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        assert!(ClientConfig::new("ftp://example.com").base_url().is_err());
        assert!(ClientConfig::new("not a url").base_url().is_err());
    }
}
