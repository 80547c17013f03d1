use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Server settings, read from an optional TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address to bind to
    pub host: String,

    pub port: u16,

    /// How long a CAPTCHA stays answerable
    pub captcha_ttl_secs: u64,

    /// Visitors idle longer than this stop counting as live
    pub visitor_idle_secs: u64,

    /// Default row count for the "recent" endpoints
    pub recent_limit: u32,

    /// Try headless Chrome before the direct fetch
    pub browser_enabled: bool,

    pub admin_pin: Option<String>,

    /// Google Safe Browsing API key
    pub safe_browsing_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            captcha_ttl_secs: 300,
            visitor_idle_secs: 3600,
            recent_limit: 20,
            browser_enabled: true,
            admin_pin: None,
            safe_browsing_key: None,
        }
    }
}

impl Settings {
    /// Defaults, overlaid with the file at `path` when one is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Failed to parse config file {:?}", path))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn captcha_ttl(&self) -> Duration {
        Duration::from_secs(self.captcha_ttl_secs)
    }

    pub fn visitor_idle(&self) -> Duration {
        Duration::from_secs(self.visitor_idle_secs)
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
