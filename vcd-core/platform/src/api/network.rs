//! 网络管理 API

use tracing::info;

use crate::api::expect_present;
use crate::client::VcdClient;
use crate::error::Result;
use crate::handle::{NetworkHandle, VdcHandle};
use crate::models::{media_types, OrgVdcNetwork};
use crate::task::Task;

/// 组织 VDC 网络管理 API
#[derive(Clone, Copy)]
pub struct NetworkApi<'a> {
    client: &'a VcdClient,
}

impl<'a> NetworkApi<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 获取网络
    pub async fn get(&self, href: &str) -> Result<NetworkHandle> {
        info!("获取网络: {}", href);
        self.client.fetch(href).await
    }

    /// 在虚拟数据中心中创建网络
    pub async fn create(
        &self,
        vdc: &VdcHandle,
        network: &OrgVdcNetwork,
    ) -> Result<(NetworkHandle, Option<Task>)> {
        info!("创建网络: {} (虚拟数据中心 {})", network.name, vdc.href());
        let path = format!("{}/networks", vdc.href());
        self.client
            .create_object(&path, media_types::ORG_VDC_NETWORK, network)
            .await
    }

    pub async fn update(
        &self,
        network: &NetworkHandle,
        desired: &OrgVdcNetwork,
    ) -> Result<Option<Task>> {
        info!("更新网络: {}", network.href());
        let submission = self
            .client
            .update_object(network.href(), media_types::ORG_VDC_NETWORK, desired)
            .await?;
        expect_present(network.href(), submission)
    }

    /// 删除网络，已不存在时返回 `None`
    pub async fn delete(&self, network: &NetworkHandle, force: bool) -> Result<Option<Task>> {
        info!("删除网络: {}", network.href());
        Ok(self
            .client
            .delete_object(network.href(), force, false)
            .await?
            .into_task())
    }
}
