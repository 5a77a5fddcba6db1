//! 日志上下文
//!
//! 会话级的日志句柄：控制输出详细程度，并在写日志前脱敏密码和令牌。
//! 由会话创建者显式构造并传入传输层，不依赖全局可变状态。

use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

const MASK: &str = "********";

/// 需要整体脱敏的请求头
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-vcloud-authorization",
    "x-vmware-vcloud-access-token",
];

/// 日志详细程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// 只记录请求行
    Quiet,
    /// 记录请求行和状态码
    #[default]
    Normal,
    /// 额外记录请求体和响应体（已脱敏）
    Verbose,
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" => Ok(Self::Quiet),
            "normal" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            other => Err(format!("未知的日志详细程度: {}", other)),
        }
    }
}

/// 会话日志上下文
///
/// 克隆后共享同一组敏感值，登录后新增的令牌对所有克隆可见。
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    verbosity: Verbosity,
    secrets: Arc<RwLock<Vec<String>>>,
}

impl LogContext {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            secrets: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// 是否记录请求体/响应体
    pub fn log_bodies(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// 注册需要脱敏的值（空值忽略）
    pub fn add_secret(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        if !secrets.iter().any(|s| s == secret) {
            secrets.push(secret.to_string());
        }
    }

    pub fn with_secret(self, secret: &str) -> Self {
        self.add_secret(secret);
        self
    }

    /// 对文本脱敏
    pub fn redact(&self, text: &str) -> String {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
    }

    /// 对请求头脱敏：敏感头整体遮盖，其余按已注册值替换
    pub fn redact_headers(&self, headers: &[(String, String)]) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(name, value)| {
                if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                    (name.clone(), MASK.to_string())
                } else {
                    (name.clone(), self.redact(value))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_registered_secrets() {
        let log = LogContext::new(Verbosity::Normal).with_secret("hunter2");
        assert_eq!(log.redact("password=hunter2"), "password=********");
        assert_eq!(log.redact("nothing here"), "nothing here");
    }

    #[test]
    fn test_secrets_shared_between_clones() {
        let log = LogContext::default();
        let clone = log.clone();
        log.add_secret("token-abc");
        assert_eq!(clone.redact("Bearer token-abc"), "Bearer ********");
    }

    #[test]
    fn test_empty_secret_ignored() {
        let log = LogContext::default().with_secret("");
        assert_eq!(log.redact("abc"), "abc");
    }

    #[test]
    fn test_redact_headers() {
        let log = LogContext::default().with_secret("s3cret");
        let headers = vec![
            ("Authorization".to_string(), "Bearer xyz".to_string()),
            ("Accept".to_string(), "application/*+json".to_string()),
            ("X-Note".to_string(), "has s3cret".to_string()),
        ];
        let redacted = log.redact_headers(&headers);
        assert_eq!(redacted[0].1, MASK);
        assert_eq!(redacted[1].1, "application/*+json");
        assert_eq!(redacted[2].1, "has ********");
    }

    #[test]
    fn test_verbosity_parse() {
        assert_eq!("verbose".parse::<Verbosity>(), Ok(Verbosity::Verbose));
        assert_eq!("QUIET".parse::<Verbosity>(), Ok(Verbosity::Quiet));
        assert!("loud".parse::<Verbosity>().is_err());
        assert!(!LogContext::new(Verbosity::Normal).log_bodies());
        assert!(LogContext::new(Verbosity::Verbose).log_bodies());
    }
}
