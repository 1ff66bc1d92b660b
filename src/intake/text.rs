//! 标题 / Slug / URL 文本工具

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use url::Url;

static SCHEME_RE: OnceLock<Regex> = OnceLock::new();
static NON_ALNUM_RE: OnceLock<Regex> = OnceLock::new();
static URL_RE: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
static LINK_RE: OnceLock<Regex> = OnceLock::new();

fn scheme_re() -> &'static Regex {
    SCHEME_RE.get_or_init(|| Regex::new(r"https?://").expect("valid regex"))
}

fn non_alnum_re() -> &'static Regex {
    NON_ALNUM_RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("valid regex"))
}

fn link_re() -> &'static Regex {
    LINK_RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// 毫秒时间戳的 36 进制表示
fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// 目录名：小写、去协议与 www.、非字母数字折叠为 `-`，末尾附 36 进制时间戳
pub fn generate_slug(text: &str, max_length: usize, now: DateTime<Utc>) -> String {
    let timestamp = base36(now.timestamp_millis().max(0) as u64);
    let lowered = text.to_lowercase();
    let without_scheme = scheme_re().replace_all(&lowered, "");
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(&*without_scheme);
    let dashed = non_alnum_re().replace_all(without_www, "-");
    let trimmed = dashed.strip_prefix('-').unwrap_or(&*dashed);
    let trimmed = trimmed.strip_suffix('-').unwrap_or(trimmed);

    let budget = max_length.saturating_sub(timestamp.len() + 1);
    let slug: String = trimmed.chars().take(budget).collect();
    if slug.is_empty() {
        timestamp
    } else {
        format!("{}-{}", slug, timestamp)
    }
}

/// `host - seg1 / seg2`；无法解析时取前 50 个字符
pub fn title_from_url(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return raw.chars().take(50).collect();
    };
    let host = parsed.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let path = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(" / ");
    if path.is_empty() {
        host.to_string()
    } else {
        format!("{} - {}", host, path)
    }
}

/// 去掉链接、折叠空白；超长时截断并加 `...`
pub fn title_from_text(text: &str, max_length: usize) -> String {
    let without_urls = link_re().replace_all(text, "");
    let clean = whitespace_re().replace_all(&without_urls, " ").trim().to_string();

    if clean.chars().count() <= max_length {
        if clean.is_empty() {
            return "X Post Research".to_string();
        }
        return clean;
    }
    let head: String = clean.chars().take(max_length.saturating_sub(3)).collect();
    format!("{}...", head.trim())
}

fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(|h| h.to_lowercase())
}

pub fn is_github_url(raw: &str) -> bool {
    matches!(host_of(raw).as_deref(), Some("github.com" | "www.github.com"))
}

/// X / Twitter 帖子链接（域名匹配且路径含 /status/）
pub fn is_x_post_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    let is_x_domain = matches!(
        parsed.host_str(),
        Some("x.com" | "twitter.com" | "www.x.com" | "www.twitter.com")
    );
    is_x_domain && parsed.path().contains("/status/")
}

/// 提取文本中的 http(s) 链接，按出现顺序去重
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in url_re().find_iter(text) {
        if !urls.iter().any(|u| u == m.as_str()) {
            urls.push(m.as_str().to_string());
        }
    }
    urls
}
