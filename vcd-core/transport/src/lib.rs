//! VCD 传输层
//!
//! 负责与云管理平台 API 的认证会话和原始请求发送。
//! 本层不做任何重试，重试策略由调用方决定。

pub mod config;
pub mod http;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::TransportConfig;
pub use http::HttpTransport;
pub use logging::{LogContext, Verbosity};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockTransport, RecordedCall};

pub use reqwest::Method;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("连接失败: {0}")]
    Connection(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("端点不可达: {0}")]
    Unreachable(String),

    #[error("未认证: {0}")]
    NotAuthenticated(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("HTTP 错误: {0}")]
    Http(String),
}

impl TransportError {
    /// 是否为永久性错误（重试无意义）
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::NotAuthenticated(_) | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// 原始请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP 方法
    pub method: Method,

    /// 绝对 href 或相对于端点根的路径
    pub path: String,

    /// 额外请求头
    pub headers: Vec<(String, String)>,

    /// 请求体（已编码的 JSON）
    pub body: Option<String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 是否为会修改远端状态的请求
    pub fn is_mutating(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

/// 原始响应
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// HTTP 状态码
    pub status: u16,

    /// 响应头（名称统一小写）
    pub headers: HashMap<String, String>,

    /// 响应体
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// 传输接口
///
/// 实现必须可在多个对象句柄之间并发共享。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送请求，返回原始响应；非 2xx 状态也作为响应返回
    async fn send(&self, request: Request) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(TransportError::Unreachable("x".into()).is_permanent());
        assert!(TransportError::NotAuthenticated("x".into()).is_permanent());
        assert!(TransportError::Config("x".into()).is_permanent());
        assert!(!TransportError::Timeout("x".into()).is_permanent());
        assert!(!TransportError::Connection("x".into()).is_permanent());
        assert!(!TransportError::Http("x".into()).is_permanent());
    }

    #[test]
    fn test_request_is_mutating() {
        assert!(!Request::get("/api/org").is_mutating());
        assert!(Request::new(Method::POST, "/api/org").is_mutating());
        assert!(Request::new(Method::DELETE, "/api/org/1").is_mutating());
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let mut response = Response::new(200, "");
        response.headers.insert("x-vcloud-authorization".into(), "abc".into());
        assert_eq!(response.header("X-VCloud-Authorization"), Some("abc"));
        assert!(response.is_success());
        assert!(!response.is_not_found());
    }
}
