//! 研究请求入口：字段校验、标题与 Prompt 生成
//!
//! 无状态；HTTP 路由把校验通过的 ResearchRequest 交给 Agent 与编排器。

mod prompts;
pub mod text;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::IntakeError;

pub use prompts::{generate_research_prompt, generate_session_title};

/// 请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Url,
    XPost,
}

/// 请求来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    ChromeExtension,
    Telegram,
}

/// POST /api/learn 的原始请求体（字段都可缺省，由 validate 判定）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchPayload {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub contained_urls: Option<Vec<String>>,
    pub telegram_chat_id: Option<i64>,
    pub chrome_tab_id: Option<i64>,
}

/// 校验通过的研究请求
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchRequest {
    pub id: String,
    pub kind: RequestType,
    pub source: RequestSource,
    pub url: Option<String>,
    pub text: Option<String>,
    pub contained_urls: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub telegram_chat_id: Option<i64>,
    pub chrome_tab_id: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ResearchPayload {
    /// 校验并补全请求。x_post 未给出 containedUrls 时从正文中提取链接。
    pub fn validate(self, id: String, now: DateTime<Utc>) -> Result<ResearchRequest, IntakeError> {
        let (Some(kind), Some(source)) = (non_empty(self.kind), non_empty(self.source)) else {
            return Err(IntakeError::MissingFields);
        };

        let kind = match kind.as_str() {
            "url" => RequestType::Url,
            "x_post" => RequestType::XPost,
            _ => return Err(IntakeError::UnsupportedType(kind)),
        };
        let source = match source.as_str() {
            "chrome_extension" => RequestSource::ChromeExtension,
            "telegram" => RequestSource::Telegram,
            _ => return Err(IntakeError::UnsupportedSource(source)),
        };

        let url = non_empty(self.url);
        let text = non_empty(self.text);
        let mut contained_urls: Vec<String> = self
            .contained_urls
            .unwrap_or_default()
            .into_iter()
            .filter(|u| !u.trim().is_empty())
            .collect();

        match kind {
            RequestType::Url if url.is_none() => return Err(IntakeError::MissingUrl),
            RequestType::XPost => {
                if contained_urls.is_empty() {
                    if let Some(body) = &text {
                        contained_urls = text::extract_urls(body);
                    }
                }
                if text.is_none() && contained_urls.is_empty() {
                    return Err(IntakeError::MissingContent);
                }
            }
            RequestType::Url => {}
        }

        Ok(ResearchRequest {
            id,
            kind,
            source,
            url,
            text,
            contained_urls,
            timestamp: now,
            telegram_chat_id: self.telegram_chat_id,
            chrome_tab_id: self.chrome_tab_id,
        })
    }
}
