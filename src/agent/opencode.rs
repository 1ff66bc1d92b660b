//! OpenCode HTTP 客户端
//!
//! - `GET  /global/health`             -> `{ "healthy": true }`
//! - `POST /session`                   -> `{ "id": "ses_..." }`
//! - `POST /session/{id}/prompt_async` -> 204
//! - `GET  /session/status`            -> `{ "ses_...": { "type": "busy" } }`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{AgentService, SessionActivity, StatusMap};
use crate::core::AgentServiceError;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    healthy: bool,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: Option<String>,
}

/// OpenCode 客户端
pub struct OpencodeClient {
    client: Client,
    base_url: String,
}

impl OpencodeClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, AgentServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 解析 `/session/status` 响应体。
/// 顶层必须是对象；每个条目逐个判定，busy / retry 视为仍在工作，
/// 其余（含无法识别的条目）视为空闲。旧版本字段名为 status，新版本为 type。
pub(crate) fn parse_status_map(body: Value) -> Result<StatusMap, AgentServiceError> {
    let raw: HashMap<String, Value> = serde_json::from_value(body)
        .map_err(|e| AgentServiceError::Malformed(e.to_string()))?;
    Ok(raw
        .into_iter()
        .map(|(handle, entry)| {
            let kind = entry
                .get("type")
                .or_else(|| entry.get("status"))
                .and_then(Value::as_str);
            let activity = match kind {
                Some("busy" | "retry") => SessionActivity::Busy,
                _ => SessionActivity::Idle,
            };
            (handle, activity)
        })
        .collect())
}

#[async_trait]
impl AgentService for OpencodeClient {
    async fn health(&self) -> bool {
        let resp = match self.client.get(self.url("/global/health")).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return false,
        };
        resp.json::<HealthResponse>()
            .await
            .map(|h| h.healthy)
            .unwrap_or(false)
    }

    async fn create_unit(&self, title: &str) -> Result<String, AgentServiceError> {
        let resp = self
            .client
            .post(self.url("/session"))
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentServiceError::Status(resp.status().as_u16()));
        }
        let body: CreateSessionResponse = resp
            .json()
            .await
            .map_err(|e| AgentServiceError::Malformed(e.to_string()))?;
        body.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AgentServiceError::Malformed("session id missing".to_string()))
    }

    async fn submit_instructions(&self, handle: &str, text: &str) -> bool {
        let body = serde_json::json!({
            "parts": [{ "type": "text", "text": text }],
        });
        match self
            .client
            .post(self.url(&format!("/session/{}/prompt_async", handle)))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::error!("Failed to send async prompt to {}: {}", handle, e);
                false
            }
        }
    }

    async fn query_status(&self) -> Result<StatusMap, AgentServiceError> {
        let resp = self.client.get(self.url("/session/status")).send().await?;
        if !resp.status().is_success() {
            return Err(AgentServiceError::Status(resp.status().as_u16()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AgentServiceError::Malformed(e.to_string()))?;
        parse_status_map(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_status_map_both_field_names() {
        let map = parse_status_map(json!({
            "ses_a": { "type": "busy" },
            "ses_b": { "status": "idle" },
            "ses_c": { "type": "retry", "attempt": 2 },
        }))
        .unwrap();
        assert_eq!(map.get("ses_a"), Some(&SessionActivity::Busy));
        assert_eq!(map.get("ses_b"), Some(&SessionActivity::Idle));
        assert_eq!(map.get("ses_c"), Some(&SessionActivity::Busy));
        assert!(map.get("ses_d").is_none());
    }

    #[test]
    fn test_parse_status_map_empty_and_malformed() {
        assert!(parse_status_map(json!({})).unwrap().is_empty());
        assert!(matches!(
            parse_status_map(json!(["ses_a"])),
            Err(AgentServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse_status_map(json!("busy")),
            Err(AgentServiceError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_status_map_bad_entry_does_not_hide_others() {
        let map = parse_status_map(json!({
            "ses_a": 3,
            "ses_b": { "type": 7 },
            "ses_c": { "type": "busy" },
            "ses_d": { "status": "retry" },
        }))
        .unwrap();
        assert_eq!(map.get("ses_a"), Some(&SessionActivity::Idle));
        assert_eq!(map.get("ses_b"), Some(&SessionActivity::Idle));
        assert_eq!(map.get("ses_c"), Some(&SessionActivity::Busy));
        assert_eq!(map.get("ses_d"), Some(&SessionActivity::Busy));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpencodeClient::new("http://localhost:4096/", 5).unwrap();
        assert_eq!(client.base_url(), "http://localhost:4096");
        assert_eq!(client.url("/session"), "http://localhost:4096/session");
    }
}
