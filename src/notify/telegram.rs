//! Telegram Bot API 通道
//!
//! `POST {api_base}/bot{token}/sendMessage`，body 含 chat_id / text / parse_mode。
//! Telegram 以 `{"ok": false, "description": ...}` 报告业务错误，HTTP 状态也可能非 2xx。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{MessageFormat, NotificationChannel, NotifyTarget};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: NotifyTarget,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram 通道
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramChannel {
    pub fn new(api_base: &str, bot_token: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, target: NotifyTarget, text: &str, format: MessageFormat) -> anyhow::Result<()> {
        let req = SendMessageRequest {
            chat_id: target,
            text,
            parse_mode: format.parse_mode(),
        };
        let resp = self
            .client
            .post(self.send_message_url())
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        let body: ApiResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => anyhow::bail!("Telegram API returned unreadable body: {}", e),
            Err(_) => anyhow::bail!("Telegram API error: HTTP {}", status),
        };
        if !status.is_success() || !body.ok {
            anyhow::bail!(
                "Telegram API error: HTTP {} {}",
                status,
                body.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_request_shape() {
        let req = SendMessageRequest {
            chat_id: -100123,
            text: "hi",
            parse_mode: MessageFormat::Html.parse_mode(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["chat_id"], -100123);
        assert_eq!(value["parse_mode"], "HTML");
    }

    #[test]
    fn test_send_message_url() {
        let channel = TelegramChannel::new("https://api.telegram.org/", "123:abc").unwrap();
        assert_eq!(
            channel.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
