//! 传输层配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Result, TransportError};

/// 传输层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// API 端点根地址，例如 `https://vcd.example.com`
    pub endpoint: String,

    /// 登录组织
    #[serde(default = "default_org")]
    pub org: String,

    /// 用户名
    #[serde(default)]
    pub username: String,

    /// 密码
    #[serde(default, skip_serializing)]
    pub password: String,

    /// API 版本
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// 是否验证 SSL 证书
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// 请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            org: default_org(),
            username: String::new(),
            password: String::new(),
            api_version: default_api_version(),
            verify_ssl: default_verify_ssl(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl TransportConfig {
    pub fn new(endpoint: &str, org: &str, username: &str, password: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            org: org.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// JSON 媒体类型（带 API 版本）
    pub fn accept_header(&self) -> String {
        format!("application/*+json;version={}", self.api_version)
    }

    /// 登录使用的 `user@org` 形式用户名
    pub fn login_name(&self) -> String {
        format!("{}@{}", self.username, self.org)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(TransportError::Config("endpoint 不能为空".to_string()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(TransportError::Config(format!(
                "endpoint 必须以 http:// 或 https:// 开头: {}",
                self.endpoint
            )));
        }
        if self.username.is_empty() {
            return Err(TransportError::Config("username 不能为空".to_string()));
        }
        if self.org.is_empty() {
            return Err(TransportError::Config("org 不能为空".to_string()));
        }
        Ok(())
    }
}

// 默认值函数
fn default_org() -> String {
    "System".to_string()
}

fn default_api_version() -> String {
    "36.0".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}
