//! CLI 配置管理
//!
//! **数据存储方式**: TOML 文件 (`$VCD_CONFIG` 或 ~/.config/vcd/config.toml)
//!
//! 环境变量优先于配置文件：
//! `VCD_URL`、`VCD_ORG`、`VCD_USER`、`VCD_PASSWORD`、`VCD_API_VERSION`、
//! `VCD_VERIFY_SSL`、`VCD_LOG_LEVEL`。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use vcd_platform::PlatformConfig;
use vcd_transport::{TransportConfig, Verbosity};

/// CLI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// 平台连接
    #[serde(default)]
    pub transport: TransportConfig,

    /// 任务轮询、重试与删除
    #[serde(default)]
    pub platform: PlatformConfig,

    /// 日志级别 (tracing EnvFilter 语法)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 请求日志详细程度
    #[serde(default)]
    pub verbosity: Verbosity,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            platform: PlatformConfig::default(),
            log_level: default_log_level(),
            verbosity: Verbosity::default(),
        }
    }
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = env::var("VCD_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("vcd").join("config.toml"))
    }

    /// 加载配置并应用环境变量
    ///
    /// 配置文件不存在时使用默认值。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if path.exists() {
            tracing::debug!("加载配置文件: {:?}", path);
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    /// 按 `lookup` 给出的变量覆盖配置
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VCD_URL") {
            self.transport.endpoint = url.trim_end_matches('/').to_string();
        }
        if let Some(org) = lookup("VCD_ORG") {
            self.transport.org = org;
        }
        if let Some(user) = lookup("VCD_USER") {
            self.transport.username = user;
        }
        if let Some(password) = lookup("VCD_PASSWORD") {
            self.transport.password = password;
        }
        if let Some(version) = lookup("VCD_API_VERSION") {
            self.transport.api_version = version;
        }
        if let Some(verify) = lookup("VCD_VERIFY_SSL") {
            self.transport.verify_ssl = verify
                .parse()
                .with_context(|| format!("VCD_VERIFY_SSL 取值无效: {}", verify))?;
        }
        if let Some(level) = lookup("VCD_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// 校验连接配置
    pub fn validate(&self) -> Result<()> {
        self.transport.validate().context("连接配置无效")?;
        if self.transport.password.is_empty() {
            anyhow::bail!("未配置密码 (VCD_PASSWORD)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert_eq!(config.transport.org, "System");
        assert_eq!(config.platform.task.poll_interval, 500);
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
log_level = "debug"
verbosity = "verbose"

[transport]
endpoint = "https://vcd.example.com"
org = "acme"
username = "admin"

[platform.task]
timeout = 120

[platform.deletion]
step_timeout = 60
"#;
        let config: CliConfig = toml::from_str(content).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.verbosity, Verbosity::Verbose);
        assert_eq!(config.transport.org, "acme");
        assert_eq!(config.transport.api_version, "36.0");
        assert_eq!(config.platform.task.timeout, 120);
        assert_eq!(config.platform.task.poll_interval, 500);
        assert_eq!(config.platform.deletion.step_timeout, 60);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CliConfig::default();
        config
            .apply_overrides(lookup(&[
                ("VCD_URL", "https://vcd.example.com/"),
                ("VCD_ORG", "acme"),
                ("VCD_USER", "admin"),
                ("VCD_PASSWORD", "secret"),
                ("VCD_VERIFY_SSL", "false"),
                ("VCD_LOG_LEVEL", "vcd_platform=debug"),
            ]))
            .unwrap();

        assert_eq!(config.transport.endpoint, "https://vcd.example.com");
        assert_eq!(config.transport.login_name(), "admin@acme");
        assert!(!config.transport.verify_ssl);
        assert_eq!(config.log_level, "vcd_platform=debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_verify_ssl() {
        let mut config = CliConfig::default();
        let result = config.apply_overrides(lookup(&[("VCD_VERIFY_SSL", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_requires_password() {
        let mut config = CliConfig::default();
        config.transport = TransportConfig::new("https://vcd.example.com", "acme", "admin", "");
        assert!(config.validate().is_err());
    }
}
