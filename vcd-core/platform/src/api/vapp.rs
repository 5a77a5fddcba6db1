//! vApp 管理 API
//!
//! vApp 的创建和追加虚拟机都经过 `Composer`，这里只做生命周期操作：
//! 部署、开机、取消部署和删除。

use tracing::info;
use vcd_transport::{Method, Request};

use crate::api::expect_present;
use crate::client::VcdClient;
use crate::compose::{CompositionRequest, CompositionTarget};
use crate::error::Result;
use crate::handle::{VAppHandle, VdcHandle, VmHandle};
use crate::models::{media_types, VApp};
use crate::task::Task;

/// vApp 管理 API
#[derive(Clone, Copy)]
pub struct VAppApi<'a> {
    client: &'a VcdClient,
}

impl<'a> VAppApi<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 获取 vApp
    pub async fn get(&self, href: &str) -> Result<VAppHandle> {
        info!("获取 vApp: {}", href);
        self.client.fetch(href).await
    }

    /// 在虚拟数据中心中组合新 vApp
    pub async fn create(
        &self,
        vdc: &VdcHandle,
        request: CompositionRequest,
    ) -> Result<(VAppHandle, Task)> {
        Ok(self
            .client
            .composer()
            .compose_vapp(CompositionTarget::Create(vdc), request)
            .await?)
    }

    /// 更新名称、描述等属性
    pub async fn update(&self, vapp: &VAppHandle, desired: &VApp) -> Result<Option<Task>> {
        info!("更新 vApp: {}", vapp.href());
        let submission = self
            .client
            .update_object(vapp.href(), media_types::VAPP, desired)
            .await?;
        expect_present(vapp.href(), submission)
    }

    /// 部署 vApp
    pub async fn deploy(&self, vapp: &VAppHandle, power_on: bool) -> Result<Option<Task>> {
        info!("部署 vApp: {} (powerOn={})", vapp.href(), power_on);
        let body = serde_json::json!({ "powerOn": power_on }).to_string();
        let submission = self
            .client
            .post_action(vapp.href(), "deploy", Some((media_types::DEPLOY_PARAMS, body)))
            .await?;
        expect_present(vapp.href(), submission)
    }

    /// 开机
    pub async fn power_on(&self, vapp: &VAppHandle) -> Result<Option<Task>> {
        info!("vApp 开机: {}", vapp.href());
        let path = format!("{}/power/action/powerOn", vapp.href());
        let submission = self.client.submit(Request::new(Method::POST, path)).await?;
        expect_present(vapp.href(), submission)
    }

    /// 关机并取消部署
    pub async fn undeploy(&self, vapp: &VAppHandle) -> Result<Option<Task>> {
        info!("取消部署 vApp: {}", vapp.href());
        let body = serde_json::json!({ "undeployPowerAction": "powerOff" }).to_string();
        let submission = self
            .client
            .post_action(vapp.href(), "undeploy", Some((media_types::UNDEPLOY_PARAMS, body)))
            .await?;
        expect_present(vapp.href(), submission)
    }

    /// 删除 vApp，已不存在时返回 `None`
    pub async fn delete(&self, vapp: &VAppHandle, force: bool) -> Result<Option<Task>> {
        info!("删除 vApp: {}", vapp.href());
        Ok(self
            .client
            .delete_object(vapp.href(), force, false)
            .await?
            .into_task())
    }

    /// 刷新并列出虚拟机
    pub async fn list_vms(&self, vapp: &mut VAppHandle) -> Result<Vec<VmHandle>> {
        vapp.refresh().await?;
        let snapshot = vapp.require_initialized()?;
        Ok(snapshot
            .vms
            .iter()
            .cloned()
            .map(|vm| VmHandle::from_snapshot(self.client.transport(), vm))
            .collect())
    }
}
