//! StepSync
//!
//! A long-running daemon that periodically submits step-count data for a set
//! of Zepp/Mi Fit accounts and pushes a per-run report to configured
//! notification sinks (PushPlus, WeCom webhook, Telegram bot).

pub mod batch;
pub mod report;
pub mod run;
pub mod schedule;
pub mod vendor;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use tracing::info;

/// Environment variable holding the JSON configuration blob.
pub const CONFIG_ENV: &str = "CONFIG";

/// Default vendor-side timezone offset from UTC, in hours.
pub const DEFAULT_TZ_OFFSET_HOURS: i32 = 8;

/// Default pause between accounts in sequential mode, in seconds.
const DEFAULT_SLEEP_GAP_SECS: f64 = 5.0;

/// Default retry budget for failed accounts.
const DEFAULT_RETRY_TIMES: u32 = 3;

/// Default cap on per-account detail lines in a report.
const DEFAULT_REPORT_MAX: usize = 30;

/// One (identifier, secret) pair sourced from configuration.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

/// Notification sink configuration.
#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    /// PushPlus token (`None` = sink disabled).
    pub push_plus_token: Option<String>,
    /// Only dispatch notifications at this local hour (`None` = always).
    pub push_plus_hour: Option<u32>,
    /// Max per-account lines before the report points at the logs instead.
    pub push_plus_max: usize,
    /// WeCom group-robot webhook key.
    pub wechat_webhook_key: Option<String>,
    /// Telegram bot token + chat id (both required for the sink).
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CONFIG environment variable is not set")]
    Missing,

    #[error("CONFIG is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("USER/PWD not configured")]
    MissingCredentials,

    #[error("account count [{users}] does not match password count [{passwords}]")]
    CredentialMismatch { users: usize, passwords: usize },
}

/// Immutable application configuration.
///
/// Constructed once at startup from the `CONFIG` JSON blob and passed by
/// reference into every component; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    users: String,
    passwords: String,
    /// Pause between accounts in sequential mode.
    pub sleep_gap: Duration,
    /// Run accounts concurrently instead of sequentially.
    pub concurrent: bool,
    /// Retry budget for failed accounts.
    pub retry_times: u32,
    /// Trigger hours in UTC, as configured (`None` = built-in defaults).
    pub cron_hours_utc: Option<Vec<u32>>,
    /// Fixed offset from UTC for all local-time decisions.
    pub tz_offset_hours: i32,
    /// Notification sinks.
    pub push: PushConfig,
}

/// Raw shape of the `CONFIG` blob. Values may arrive as JSON strings or
/// numbers; both are accepted.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(rename = "USER")]
    user: Option<String>,
    #[serde(rename = "PWD")]
    pwd: Option<String>,
    #[serde(rename = "SLEEP_GAP")]
    sleep_gap: Option<Flexible>,
    #[serde(rename = "USE_CONCURRENT")]
    use_concurrent: Option<Flexible>,
    #[serde(rename = "RETRY_TIMES")]
    retry_times: Option<Flexible>,
    #[serde(rename = "CRON_HOURS")]
    cron_hours: Option<String>,
    #[serde(rename = "TZ_OFFSET_HOURS")]
    tz_offset_hours: Option<Flexible>,
    #[serde(rename = "PUSH_PLUS_TOKEN")]
    push_plus_token: Option<String>,
    #[serde(rename = "PUSH_PLUS_HOUR")]
    push_plus_hour: Option<Flexible>,
    #[serde(rename = "PUSH_PLUS_MAX")]
    push_plus_max: Option<Flexible>,
    #[serde(rename = "WECHAT_WEBHOOK_KEY")]
    wechat_webhook_key: Option<String>,
    #[serde(rename = "TELEGRAM_BOT_TOKEN")]
    telegram_bot_token: Option<String>,
    #[serde(rename = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<Flexible>,
}

/// A JSON value that may be a string, number or bool.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Flexible {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Flexible {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Flexible::Num(n) => Some(*n),
            Flexible::Str(s) => s.trim().parse().ok(),
            Flexible::Bool(_) => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        self.as_f64().filter(|n| *n >= 0.0).map(|n| n as u32)
    }

    fn as_i32(&self) -> Option<i32> {
        self.as_f64().map(|n| n as i32)
    }

    fn as_bool(&self) -> bool {
        match self {
            Flexible::Bool(b) => *b,
            Flexible::Str(s) => {
                matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
            }
            Flexible::Num(n) => *n != 0.0,
        }
    }

    fn as_string(&self) -> String {
        match self {
            Flexible::Str(s) => s.clone(),
            Flexible::Num(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Flexible::Bool(b) => b.to_string(),
        }
    }
}

/// Treat empty strings and the literal "NO" as an unset token.
fn token_or_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && v.trim() != "NO")
}

impl Config {
    /// Load configuration from the `CONFIG` environment variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let blob = std::env::var(CONFIG_ENV).map_err(|_| ConfigError::Missing)?;
        Self::from_json(&blob)
    }

    /// Parse configuration from a JSON blob.
    pub fn from_json(blob: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(blob)?;

        let sleep_gap = raw
            .sleep_gap
            .as_ref()
            .and_then(Flexible::as_f64)
            .filter(|s| *s >= 0.0)
            .unwrap_or(DEFAULT_SLEEP_GAP_SECS);

        let cron_hours_utc = raw.cron_hours.as_deref().and_then(parse_hour_list);

        let tz_offset_hours = raw
            .tz_offset_hours
            .as_ref()
            .and_then(Flexible::as_i32)
            .filter(|h| (-23..=23).contains(h))
            .unwrap_or(DEFAULT_TZ_OFFSET_HOURS);

        let push = PushConfig {
            push_plus_token: token_or_none(raw.push_plus_token),
            push_plus_hour: raw
                .push_plus_hour
                .as_ref()
                .and_then(Flexible::as_u32)
                .filter(|h| *h < 24),
            push_plus_max: raw
                .push_plus_max
                .as_ref()
                .and_then(Flexible::as_u32)
                .map(|m| m as usize)
                .unwrap_or(DEFAULT_REPORT_MAX),
            wechat_webhook_key: token_or_none(raw.wechat_webhook_key),
            telegram_bot_token: token_or_none(raw.telegram_bot_token),
            telegram_chat_id: token_or_none(raw.telegram_chat_id.map(|v| v.as_string())),
        };

        Ok(Self {
            users: raw.user.unwrap_or_default(),
            passwords: raw.pwd.unwrap_or_default(),
            sleep_gap: Duration::from_secs_f64(sleep_gap),
            concurrent: raw.use_concurrent.map(|v| v.as_bool()).unwrap_or(false),
            retry_times: raw
                .retry_times
                .as_ref()
                .and_then(Flexible::as_u32)
                .unwrap_or(DEFAULT_RETRY_TIMES),
            cron_hours_utc,
            tz_offset_hours,
            push,
        })
    }

    /// Pair up the `#`-joined account and password lists.
    ///
    /// Checked at batch time rather than startup so a bad credential blob
    /// skips the run instead of killing the daemon.
    pub fn credentials(&self) -> Result<Vec<Credential>, ConfigError> {
        if self.users.is_empty() || self.passwords.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let users: Vec<&str> = self.users.split('#').collect();
        let passwords: Vec<&str> = self.passwords.split('#').collect();

        if users.len() != passwords.len() {
            return Err(ConfigError::CredentialMismatch {
                users: users.len(),
                passwords: passwords.len(),
            });
        }

        Ok(users
            .into_iter()
            .zip(passwords)
            .map(|(user, password)| Credential {
                user: user.to_string(),
                password: password.to_string(),
            })
            .collect())
    }

    /// Fixed local timezone used for every scheduling decision.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_hours * 3600).unwrap_or_else(|| {
            FixedOffset::east_opt(DEFAULT_TZ_OFFSET_HOURS * 3600).expect("static offset")
        })
    }

    /// Current time in the configured fixed offset.
    pub fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.timezone())
    }
}

/// Parse a comma-joined hour list, dropping anything that is not 0-23.
fn parse_hour_list(raw: &str) -> Option<Vec<u32>> {
    let hours: Vec<u32> = raw
        .split(',')
        .filter_map(|h| h.trim().parse::<u32>().ok())
        .filter(|h| *h < 24)
        .collect();

    if hours.is_empty() {
        None
    } else {
        Some(hours)
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stepsync").join("logs"))
}

/// Initialize logging: console layer plus a daily-rolling file layer.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "stepsync.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Log files saved to: {}", log_dir.display());
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typical_blob() {
        let config = Config::from_json(
            r#"{
                "USER": "13812345678#abc@example.com",
                "PWD": "pass1#pass2",
                "SLEEP_GAP": "2.5",
                "USE_CONCURRENT": "True",
                "RETRY_TIMES": "2",
                "CRON_HOURS": "0,4,8,10",
                "PUSH_PLUS_TOKEN": "tok",
                "PUSH_PLUS_HOUR": "18",
                "PUSH_PLUS_MAX": 10
            }"#,
        )
        .unwrap();

        assert_eq!(config.sleep_gap, Duration::from_millis(2500));
        assert!(config.concurrent);
        assert_eq!(config.retry_times, 2);
        assert_eq!(config.cron_hours_utc, Some(vec![0, 4, 8, 10]));
        assert_eq!(config.push.push_plus_token.as_deref(), Some("tok"));
        assert_eq!(config.push.push_plus_hour, Some(18));
        assert_eq!(config.push.push_plus_max, 10);

        let creds = config.credentials().unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].user, "13812345678");
        assert_eq!(creds[1].password, "pass2");
    }

    #[test]
    fn test_numeric_fields_accept_numbers() {
        let config = Config::from_json(
            r#"{"USER": "u", "PWD": "p", "SLEEP_GAP": 3, "RETRY_TIMES": 1, "TELEGRAM_CHAT_ID": 12345}"#,
        )
        .unwrap();

        assert_eq!(config.sleep_gap, Duration::from_secs(3));
        assert_eq!(config.retry_times, 1);
        assert_eq!(config.push.telegram_chat_id.as_deref(), Some("12345"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.sleep_gap, Duration::from_secs(5));
        assert!(!config.concurrent);
        assert_eq!(config.retry_times, 3);
        assert_eq!(config.cron_hours_utc, None);
        assert_eq!(config.tz_offset_hours, 8);
        assert_eq!(config.push.push_plus_max, 30);
    }

    #[test]
    fn test_credential_mismatch() {
        let config = Config::from_json(r#"{"USER": "a#b#c", "PWD": "x#y"}"#).unwrap();
        match config.credentials() {
            Err(ConfigError::CredentialMismatch { users, passwords }) => {
                assert_eq!(users, 3);
                assert_eq!(passwords, 2);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_credentials() {
        let config = Config::from_json(r#"{"SLEEP_GAP": 1}"#).unwrap();
        assert!(matches!(config.credentials(), Err(ConfigError::MissingCredentials)));
    }

    #[test]
    fn test_no_token_disables_sink() {
        let config =
            Config::from_json(r#"{"PUSH_PLUS_TOKEN": "NO", "WECHAT_WEBHOOK_KEY": ""}"#).unwrap();
        assert!(config.push.push_plus_token.is_none());
        assert!(config.push.wechat_webhook_key.is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(Config::from_json("not json"), Err(ConfigError::Parse(_))));
    }
}
