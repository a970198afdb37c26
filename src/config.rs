use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use thiserror::Error;

use crate::infrastructure::messaging::http_bridge::HttpBridgeConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env param {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for env param {name}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_connection_string: String,
    pub store_max_connections: u32,
    pub delete_sent_messages: bool,
    pub retry_failed_messages: bool,
    pub pacing_delay: Duration,
    pub reconnect_backoff: Duration,
    pub readiness_poll_interval: Duration,
    /// `None` runs a single drain and exits.
    pub poll_interval: Option<Duration>,
    pub chat_suffix: String,
    pub transport: HttpBridgeConfig,
    pub qr_code_path: PathBuf,
    pub http_port: Option<u16>,
}

impl Config {
    pub fn try_parse() -> Result<Config, ConfigError> {
        let _ = dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let env = Env { lookup: &lookup };

        Ok(Config {
            store_connection_string: env.required("STORE_CONNECTION_STRING")?,
            store_max_connections: env.parsed("STORE_MAX_CONNECTIONS")?.unwrap_or(5),
            delete_sent_messages: env.flag("DELETE_SENT_MESSAGES")?,
            retry_failed_messages: env.flag("RETRY_FAILED_MESSAGES")?,
            pacing_delay: env.seconds("PACING_DELAY_SECS")?.unwrap_or(Duration::from_secs(1)),
            reconnect_backoff: env
                .seconds("RECONNECT_BACKOFF_SECS")?
                .unwrap_or(Duration::from_secs(5)),
            readiness_poll_interval: env
                .seconds("READINESS_POLL_SECS")?
                .unwrap_or(Duration::from_secs(1)),
            poll_interval: env.seconds("POLL_INTERVAL_SECS")?,
            chat_suffix: env
                .optional("TRANSPORT_CHAT_SUFFIX")
                .unwrap_or_else(|| "@c.us".to_string()),
            transport: HttpBridgeConfig {
                base_url: env.required("TRANSPORT_BASE_URL")?,
                session_id: env
                    .optional("TRANSPORT_SESSION_ID")
                    .unwrap_or_else(|| "app2".to_string()),
                api_token: env.optional("TRANSPORT_API_TOKEN"),
                status_poll_interval: env
                    .seconds("TRANSPORT_STATUS_POLL_SECS")?
                    .unwrap_or(Duration::from_secs(1)),
                request_timeout: Duration::from_secs(
                    env.parsed("TRANSPORT_TIMEOUT_SECS")?.unwrap_or(30),
                ),
            },
            qr_code_path: env
                .optional("QR_CODE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("qr-code.txt")),
            http_port: env.parsed("HTTP_PORT")?,
        })
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn optional(&self, name: &'static str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed<T: std::str::FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        self.optional(name)
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { name, value })
            })
            .transpose()
    }

    fn seconds(&self, name: &'static str) -> Result<Option<Duration>, ConfigError> {
        let Some(value) = self.optional(name) else {
            return Ok(None);
        };
        match value.trim().parse::<f64>().ok().map(Duration::try_from_secs_f64) {
            Some(Ok(delay)) => Ok(Some(delay)),
            _ => Err(ConfigError::Invalid { name, value }),
        }
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        let Some(value) = self.optional(name) else {
            return Ok(false);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        }
    }
}
