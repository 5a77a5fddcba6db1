//! 虚拟数据中心管理 API

use tracing::info;

use crate::api::expect_present;
use crate::client::VcdClient;
use crate::error::Result;
use crate::handle::{OrgHandle, VdcHandle};
use crate::models::{media_types, CreateVdcParams, Reference, Vdc};
use crate::task::Task;

/// 虚拟数据中心管理 API
#[derive(Clone, Copy)]
pub struct VdcApi<'a> {
    client: &'a VcdClient,
}

impl<'a> VdcApi<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 获取虚拟数据中心
    pub async fn get(&self, href: &str) -> Result<VdcHandle> {
        info!("获取虚拟数据中心: {}", href);
        self.client.fetch(href).await
    }

    /// 在组织下创建虚拟数据中心
    pub async fn create(
        &self,
        org: &OrgHandle,
        params: &CreateVdcParams,
    ) -> Result<(VdcHandle, Option<Task>)> {
        info!("创建虚拟数据中心: {} (组织 {})", params.name, org.href());
        let path = format!("{}/vdcsparams", org.href());
        self.client
            .create_object(&path, media_types::VDC_PARAMS, params)
            .await
    }

    pub async fn update(&self, vdc: &VdcHandle, desired: &Vdc) -> Result<Option<Task>> {
        info!("更新虚拟数据中心: {}", vdc.href());
        let submission = self
            .client
            .update_object(vdc.href(), media_types::ADMIN_VDC, desired)
            .await?;
        expect_present(vdc.href(), submission)
    }

    pub async fn enable(&self, vdc: &VdcHandle) -> Result<Option<Task>> {
        info!("启用虚拟数据中心: {}", vdc.href());
        let submission = self.client.post_action(vdc.href(), "enable", None).await?;
        expect_present(vdc.href(), submission)
    }

    pub async fn disable(&self, vdc: &VdcHandle) -> Result<Option<Task>> {
        info!("禁用虚拟数据中心: {}", vdc.href());
        let submission = self.client.post_action(vdc.href(), "disable", None).await?;
        expect_present(vdc.href(), submission)
    }

    /// 删除虚拟数据中心，已不存在时返回 `None`
    pub async fn delete(
        &self,
        vdc: &VdcHandle,
        force: bool,
        recursive: bool,
    ) -> Result<Option<Task>> {
        info!("删除虚拟数据中心: {}", vdc.href());
        Ok(self
            .client
            .delete_object(vdc.href(), force, recursive)
            .await?
            .into_task())
    }

    /// 刷新并列出 vApp
    pub async fn list_vapps(&self, vdc: &mut VdcHandle) -> Result<Vec<Reference>> {
        vdc.refresh().await?;
        Ok(vdc.require_initialized()?.vapps.clone())
    }
}
