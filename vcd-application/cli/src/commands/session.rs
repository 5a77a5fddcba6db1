//! 会话管理
//!
//! 登录平台并构造各命令共享的 `VcdClient`。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use vcd_platform::VcdClient;
use vcd_transport::{HttpTransport, LogContext};

use crate::config::CliConfig;

pub struct Session {
    transport: Arc<HttpTransport>,
    client: VcdClient,
}

impl Session {
    /// 创建传输层并登录
    pub async fn open(config: &CliConfig) -> Result<Self> {
        let log = LogContext::new(config.verbosity).with_secret(&config.transport.password);
        let transport = Arc::new(
            HttpTransport::new(config.transport.clone(), log).context("创建传输层失败")?,
        );

        transport.login().await.context("登录失败")?;
        info!("已登录: {}", config.transport.endpoint);

        let client = VcdClient::new(transport.clone(), config.platform.clone());
        Ok(Self { transport, client })
    }

    pub fn client(&self) -> &VcdClient {
        &self.client
    }

    /// 注销会话，失败只记录日志
    pub async fn close(&self) {
        if let Err(e) = self.transport.logout().await {
            warn!("注销失败: {}", e);
        }
    }
}
