//! 虚拟机管理 API

use std::collections::HashSet;

use tracing::info;
use vcd_transport::{Method, Request};

use crate::api::expect_present;
use crate::client::VcdClient;
use crate::compose::{
    resolve_connections, CompositionRequest, CompositionTarget, NetworkAttachment, VmSource,
};
use crate::error::Result;
use crate::handle::{VAppHandle, VmHandle};
use crate::models::{media_types, Vm};
use crate::task::Task;

/// 虚拟机管理 API
#[derive(Clone, Copy)]
pub struct VmApi<'a> {
    client: &'a VcdClient,
}

impl<'a> VmApi<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 获取虚拟机
    pub async fn get(&self, href: &str) -> Result<VmHandle> {
        info!("获取虚拟机: {}", href);
        self.client.fetch(href).await
    }

    /// 向 vApp 追加一台虚拟机
    pub async fn create(&self, vapp: &VAppHandle, source: VmSource) -> Result<(VAppHandle, Task)> {
        info!("追加虚拟机 {} 到 vApp {}", source.name, vapp.href());
        let request = CompositionRequest::new("").vm(source);
        Ok(self
            .client
            .composer()
            .compose_vapp(CompositionTarget::Update(vapp), request)
            .await?)
    }

    pub async fn update(&self, vm: &VmHandle, desired: &Vm) -> Result<Option<Task>> {
        info!("更新虚拟机: {}", vm.href());
        let submission = self
            .client
            .update_object(vm.href(), media_types::VM, desired)
            .await?;
        expect_present(vm.href(), submission)
    }

    /// 替换虚拟机的网卡配置
    ///
    /// 网卡引用的网络必须已加入父 vApp，校验失败时不发送请求。
    pub async fn update_network(
        &self,
        vapp: &VAppHandle,
        vm: &VmHandle,
        attachments: &[NetworkAttachment],
    ) -> Result<Option<Task>> {
        let parent = vapp.require_initialized()?;
        let declared: HashSet<&str> = parent.network_names().collect();
        let section = resolve_connections(vm.name(), attachments, &declared)?;

        info!("更新虚拟机网卡: {} ({} 个)", vm.href(), attachments.len());
        let path = format!("{}/networkConnectionSection/", vm.href());
        let submission = self
            .client
            .update_object(&path, media_types::NETWORK_CONNECTION_SECTION, &section)
            .await?;
        expect_present(vm.href(), submission)
    }

    /// 开机
    pub async fn power_on(&self, vm: &VmHandle) -> Result<Option<Task>> {
        info!("虚拟机开机: {}", vm.href());
        let path = format!("{}/power/action/powerOn", vm.href());
        let submission = self.client.submit(Request::new(Method::POST, path)).await?;
        expect_present(vm.href(), submission)
    }

    /// 关机并取消部署
    pub async fn undeploy(&self, vm: &VmHandle) -> Result<Option<Task>> {
        info!("取消部署虚拟机: {}", vm.href());
        let body = serde_json::json!({ "undeployPowerAction": "powerOff" }).to_string();
        let submission = self
            .client
            .post_action(vm.href(), "undeploy", Some((media_types::UNDEPLOY_PARAMS, body)))
            .await?;
        expect_present(vm.href(), submission)
    }

    /// 删除虚拟机，已不存在时返回 `None`
    pub async fn delete(&self, vm: &VmHandle) -> Result<Option<Task>> {
        info!("删除虚拟机: {}", vm.href());
        Ok(self
            .client
            .delete_object(vm.href(), false, false)
            .await?
            .into_task())
    }
}
