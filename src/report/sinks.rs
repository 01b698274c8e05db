//! Notification sinks: PushPlus, WeCom group webhook, Telegram bot.
//!
//! Sinks are independent: one sink failing is logged and never blocks the
//! others, and no sink failure affects run accounting.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::PushConfig;

const PUSH_PLUS_URL: &str = "http://www.pushplus.plus/send";
const WECOM_URL: &str = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send";
const TELEGRAM_URL: &str = "https://api.telegram.org";

/// Externally-written record of an off-schedule trigger; its hour can
/// satisfy the "notify only at hour H" gate.
const OVERRIDE_FILE: &str = "cron_change_time";

const SINK_TIMEOUT_SECS: u64 = 10;

/// Sink delivery errors. Logged by the dispatcher, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected the message: {0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct PushPlusResponse {
    code: Option<i64>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WecomResponse {
    errcode: Option<i64>,
    errmsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: Option<bool>,
    description: Option<String>,
}

/// Dispatches a run report to every configured sink.
pub struct Notifier {
    client: Client,
    config: PushConfig,
}

impl Notifier {
    pub fn new(config: &PushConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SINK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config: config.clone() })
    }

    /// Send the report to all configured sinks, honoring the notify-hour
    /// gate. Individual sink failures are logged and swallowed.
    pub async fn dispatch(&self, now: DateTime<FixedOffset>, title: &str, content: &str) {
        let override_hour = override_hour(Path::new(OVERRIDE_FILE));
        if !gate_allows(self.config.push_plus_hour, now.hour(), override_hour) {
            info!(
                "Notify hour {:?} does not match current hour {}, suppressing report",
                self.config.push_plus_hour,
                now.hour()
            );
            return;
        }

        if let Some(token) = &self.config.push_plus_token {
            match self.push_plus(token, title, content).await {
                Ok(()) => info!("PushPlus report delivered"),
                Err(e) => warn!("PushPlus delivery failed: {}", e),
            }
        }

        if let Some(key) = &self.config.wechat_webhook_key {
            match self.wecom(key, title, content).await {
                Ok(()) => info!("WeCom report delivered"),
                Err(e) => warn!("WeCom delivery failed: {}", e),
            }
        }

        if let (Some(token), Some(chat_id)) =
            (&self.config.telegram_bot_token, &self.config.telegram_chat_id)
        {
            match self.telegram(token, chat_id, content).await {
                Ok(()) => info!("Telegram report delivered"),
                Err(e) => warn!("Telegram delivery failed: {}", e),
            }
        }
    }

    async fn push_plus(&self, token: &str, title: &str, content: &str) -> Result<(), SinkError> {
        let response: PushPlusResponse = self
            .client
            .post(PUSH_PLUS_URL)
            .form(&[
                ("token", token),
                ("title", title),
                ("content", content),
                ("template", "html"),
                ("channel", "wechat"),
            ])
            .send()
            .await?
            .json()
            .await?;

        match response.code {
            Some(200) => Ok(()),
            _ => Err(SinkError::Rejected(
                response.msg.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    async fn wecom(&self, key: &str, title: &str, content: &str) -> Result<(), SinkError> {
        let payload = json!({
            "msgtype": "markdown_v2",
            "markdown_v2": { "content": format!("# {title}\n{content}") },
        });

        let response: WecomResponse = self
            .client
            .post(format!("{WECOM_URL}?key={key}"))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        match response.errcode {
            Some(0) => Ok(()),
            _ => Err(SinkError::Rejected(
                response.errmsg.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    async fn telegram(&self, token: &str, chat_id: &str, content: &str) -> Result<(), SinkError> {
        // Telegram wants a numeric chat id where possible.
        let chat_id = chat_id
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::from(chat_id));

        let payload = json!({
            "chat_id": chat_id,
            "text": content,
            "parse_mode": "HTML",
        });

        let response: TelegramResponse = self
            .client
            .post(format!("{TELEGRAM_URL}/bot{token}/sendMessage"))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        match response.ok {
            Some(true) => Ok(()),
            _ => Err(SinkError::Rejected(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

/// Notify-hour gate: dispatch unless a notify hour is configured and
/// neither the current hour nor the override record matches it.
fn gate_allows(notify_hour: Option<u32>, now_hour: u32, override_hour: Option<u32>) -> bool {
    match notify_hour {
        None => true,
        Some(h) => now_hour == h || override_hour == Some(h),
    }
}

/// Read the trigger hour from the override file's last non-empty line,
/// e.g. `... (08:30)` -> 8. Missing or unparsable files yield `None`.
fn override_hour(path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(path).ok()?;
    let line = content.lines().rev().find(|l| !l.trim().is_empty())?;
    parse_hour_in_parens(line)
}

/// Extract `H` from the first `(H:MM...)` group in the line.
fn parse_hour_in_parens(line: &str) -> Option<u32> {
    let mut rest = line;
    while let Some(start) = rest.find('(') {
        let after = &rest[start + 1..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && after[digits.len()..].starts_with(':') {
            return digits.parse().ok().filter(|h| *h < 24);
        }
        rest = after;
    }
    None
}
