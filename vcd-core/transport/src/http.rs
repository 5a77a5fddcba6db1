//! 基于 reqwest 的 HTTP 传输实现

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    LogContext, Request, Response, Result, Transport, TransportConfig, TransportError, Verbosity,
};

/// 新版令牌响应头
const ACCESS_TOKEN_HEADER: &str = "x-vmware-vcloud-access-token";

/// 旧版会话令牌响应头
const LEGACY_TOKEN_HEADER: &str = "x-vcloud-authorization";

/// HTTP 传输
///
/// 内部的 reqwest 连接池可在多个对象句柄之间并发共享。
pub struct HttpTransport {
    /// 配置
    config: TransportConfig,

    /// API 基础 URL
    base_url: Url,

    /// HTTP 客户端
    http_client: Client,

    /// 认证令牌
    access_token: Arc<RwLock<Option<String>>>,

    /// 会话日志上下文
    log: LogContext,
}

impl HttpTransport {
    /// 创建新的传输实例（尚未登录）
    pub fn new(config: TransportConfig, log: LogContext) -> Result<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.endpoint).map_err(|e| {
            TransportError::Config(format!("无效的 endpoint {}: {}", config.endpoint, e))
        })?;

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        log.add_secret(&config.password);

        Ok(Self {
            config,
            base_url,
            http_client,
            access_token: Arc::new(RwLock::new(None)),
            log,
        })
    }

    /// 创建会话
    pub async fn login(&self) -> Result<()> {
        info!("登录云管理平台: {} ({})", self.config.endpoint, self.config.login_name());

        let url = self.resolve("/api/sessions")?;
        let response = self
            .http_client
            .post(url)
            .basic_auth(self.config.login_name(), Some(&self.config.password))
            .header("Accept", self.config.accept_header())
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::NotAuthenticated(format!(
                "登录被拒绝: {}",
                self.config.login_name()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!(
                "登录失败 [{}]: {}",
                status.as_u16(),
                self.log.redact(&body)
            )));
        }

        let token = response
            .headers()
            .get(ACCESS_TOKEN_HEADER)
            .map(|v| ("Bearer", v))
            .or_else(|| response.headers().get(LEGACY_TOKEN_HEADER).map(|v| ("Legacy", v)))
            .and_then(|(scheme, v)| v.to_str().ok().map(|s| format!("{} {}", scheme, s)))
            .ok_or_else(|| TransportError::NotAuthenticated("响应中未获取到令牌".to_string()))?;

        if let Some((_, raw)) = token.split_once(' ') {
            self.log.add_secret(raw);
        }
        *self.access_token.write().await = Some(token);

        info!("登录成功");
        Ok(())
    }

    /// 注销会话（尽力而为）
    pub async fn logout(&self) -> Result<()> {
        info!("注销会话");
        let token = self.access_token.write().await.take();
        if let Some(token) = token {
            let url = self.resolve("/api/session")?;
            let request = self.authorize(self.http_client.delete(url), &token);
            if let Err(e) = request.send().await {
                warn!("注销会话失败: {}", e);
            }
        }
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// 将绝对 href 或相对路径解析为完整 URL
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let parsed = if path.starts_with("http://") || path.starts_with("https://") {
            Url::parse(path)
        } else {
            self.base_url.join(path)
        };
        parsed.map_err(|e| TransportError::Config(format!("无效的路径 {}: {}", path, e)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", self.config.accept_header());
        match token.split_once(' ') {
            Some(("Legacy", raw)) => builder.header(LEGACY_TOKEN_HEADER, raw),
            _ => builder.header("Authorization", token),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let url = self.resolve(&request.path)?;

        let token = self.access_token.read().await.clone().ok_or_else(|| {
            TransportError::NotAuthenticated("未认证，请先登录".to_string())
        })?;

        debug!("API 请求: {} {}", request.method, self.log.redact(url.as_str()));
        if self.log.log_bodies() {
            debug!("请求头: {:?}", self.log.redact_headers(&request.headers));
            if let Some(ref body) = request.body {
                debug!("请求体: {}", self.log.redact(body));
            }
        }

        let raw = self.http_client.request(request.method.clone(), url.clone());
        let mut builder = self.authorize(raw, &token);
        let has_content_type = request
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            if !has_content_type {
                builder = builder.header("Content-Type", "application/json");
            }
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(format!("读取响应体失败: {}", e)))?;

        if self.log.verbosity() != Verbosity::Quiet {
            debug!("API 响应: {} {}", status, self.log.redact(url.as_str()));
        }
        if self.log.log_bodies() {
            debug!("响应体: {}", self.log.redact(&body));
        }

        Ok(Response { status, headers, body })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else if e.is_builder() {
        TransportError::Config(e.to_string())
    } else {
        TransportError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        let config = TransportConfig::new("https://vcd.example.com", "acme", "admin", "pw");
        HttpTransport::new(config, LogContext::default()).unwrap()
    }

    #[test]
    fn test_http_transport_creation() {
        assert!(HttpTransport::new(
            TransportConfig::new("https://vcd.example.com", "acme", "admin", "pw"),
            LogContext::default(),
        )
        .is_ok());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = TransportConfig::new("vcd.example.com", "acme", "admin", "pw");
        let result = HttpTransport::new(config, LogContext::default());
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let t = transport();
        assert_eq!(
            t.resolve("/api/task/1").unwrap().as_str(),
            "https://vcd.example.com/api/task/1"
        );
        assert_eq!(
            t.resolve("https://other.example.com/api/vApp/vapp-1").unwrap().as_str(),
            "https://other.example.com/api/vApp/vapp-1"
        );
    }

    #[test]
    fn test_password_registered_as_secret() {
        let log = LogContext::default();
        let config = TransportConfig::new("https://vcd.example.com", "acme", "admin", "pa55word");
        let _t = HttpTransport::new(config, log.clone()).unwrap();
        assert_eq!(log.redact("pa55word"), "********");
    }

    #[tokio::test]
    async fn test_send_without_login_fails() {
        let t = transport();
        let err = t.send(Request::get("/api/org")).await.unwrap_err();
        assert!(matches!(err, TransportError::NotAuthenticated(_)));
        assert!(!t.is_authenticated().await);
    }
}
