//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BUILDLEARN__*` 覆盖（双下划线表示嵌套，如 `BUILDLEARN__POLLER__INTERVAL_SECS=2`）。
//! Telegram token 额外兼容 `TELEGRAM_BOT_TOKEN`。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub opencode: OpencodeSection,
    pub poller: PollerSection,
    pub database: DatabaseSection,
    pub telegram: TelegramSection,
    pub intake: IntakeSection,
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3456".to_string()
}

/// [opencode] 段：Agent 服务地址与请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct OpencodeSection {
    #[serde(default = "default_opencode_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OpencodeSection {
    fn default() -> Self {
        Self {
            url: default_opencode_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_opencode_url() -> String {
    "http://localhost:4096".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// [poller] 段：探测间隔与最长等待（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct PollerSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_duration_secs() -> u64 {
    30 * 60
}

/// [database] 段：SQLite 文件路径
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("research/history.db")
}

/// [telegram] 段：未配置 token 时不发送任何通知
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_telegram_api_base(),
        }
    }
}

impl TelegramSection {
    /// 配置优先，其次 TELEGRAM_BOT_TOKEN；空串视为未配置
    pub fn resolve_token(&self) -> Option<String> {
        self.bot_token
            .clone()
            .or_else(|| std::env::var("TELEGRAM_BOT_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// [intake] 段：研究产出目录与列表分页
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeSection {
    #[serde(default = "default_research_root")]
    pub research_root: String,
    #[serde(default = "default_list_limit")]
    pub list_limit_default: usize,
    #[serde(default = "default_list_limit_max")]
    pub list_limit_max: usize,
}

impl Default for IntakeSection {
    fn default() -> Self {
        Self {
            research_root: default_research_root(),
            list_limit_default: default_list_limit(),
            list_limit_max: default_list_limit_max(),
        }
    }
}

fn default_research_root() -> String {
    "./research".to_string()
}

fn default_list_limit() -> usize {
    50
}

fn default_list_limit_max() -> usize {
    100
}

/// 从 config 目录加载配置，环境变量 BUILDLEARN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BUILDLEARN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BUILDLEARN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.poller.interval_secs, 5);
        assert_eq!(cfg.poller.max_duration_secs, 1800);
        assert_eq!(cfg.opencode.url, "http://localhost:4096");
        assert_eq!(cfg.server.bind, "0.0.0.0:3456");
        assert_eq!(cfg.database.path, PathBuf::from("research/history.db"));
        assert_eq!(cfg.intake.list_limit_max, 100);
    }

    #[test]
    fn test_load_config_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[poller]\ninterval_secs = 2\n\n[telegram]\nbot_token = \"123:abc\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.poller.interval_secs, 2);
        assert_eq!(cfg.poller.max_duration_secs, 1800);
        assert_eq!(cfg.telegram.resolve_token().as_deref(), Some("123:abc"));
    }

    #[test]
    fn test_blank_token_is_unconfigured() {
        let section = TelegramSection {
            bot_token: Some("  ".to_string()),
            ..TelegramSection::default()
        };
        assert!(section.resolve_token().is_none());
    }
}
