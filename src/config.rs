//! Runtime configuration, read from `QUICKEVAL_*` environment variables.

use crate::portal::{DEFAULT_PORTAL_URL, PortalConfig};
use anyhow::Context;
use figment::Figment;
use figment::providers::Env;
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "QUICKEVAL_";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Level for this crate's own log events; other crates stay at `warn`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    #[serde(
        default = "default_phase_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub phase_delay: Duration,
    #[serde(
        default = "default_course_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub course_delay: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_portal_url() -> String {
    DEFAULT_PORTAL_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_phase_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_course_delay() -> Duration {
    Duration::from_secs(2)
}

impl Config {
    /// Load from the process environment (after `.env` has been applied).
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Figment::new().merge(Env::prefixed(ENV_PREFIX)))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        figment.extract().context("Failed to load config")
    }

    /// Settings for the portal client.
    pub fn portal(&self) -> anyhow::Result<PortalConfig> {
        let base_url = Url::parse(&self.portal_url)
            .with_context(|| format!("Invalid portal URL: {}", self.portal_url))?;
        Ok(PortalConfig {
            base_url,
            request_timeout: self.request_timeout,
            phase_delay: self.phase_delay,
            course_delay: self.course_delay,
        })
    }
}

/// Accepts bare seconds (`30`) or a duration string (`"1500ms"`, `"2m"`).
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
    ]);
    let parsed = parser
        .parse(text.trim())
        .map_err(|e| format!("invalid duration {text:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {text:?}: {e}"))
}
