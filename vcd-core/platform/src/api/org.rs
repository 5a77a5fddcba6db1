//! 组织管理 API

use tracing::info;

use crate::api::expect_present;
use crate::client::VcdClient;
use crate::error::{Result, VcdError};
use crate::handle::OrgHandle;
use crate::models::{media_types, CreateOrgParams, Org};
use crate::task::Task;

/// 组织管理 API
#[derive(Clone, Copy)]
pub struct OrgApi<'a> {
    client: &'a VcdClient,
}

impl<'a> OrgApi<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 获取组织
    pub async fn get(&self, href: &str) -> Result<OrgHandle> {
        info!("获取组织: {}", href);
        self.client.fetch(href).await
    }

    /// 按名称查找组织
    pub async fn find_by_name(&self, name: &str) -> Result<OrgHandle> {
        info!("查找组织: {}", name);
        let reference = self
            .client
            .query_reference("organization", name)
            .await?
            .ok_or_else(|| VcdError::NotFound(format!("组织 {}", name)))?;
        self.client.fetch(&reference.href).await
    }

    /// 创建组织
    pub async fn create(&self, params: &CreateOrgParams) -> Result<(OrgHandle, Option<Task>)> {
        info!("创建组织: {}", params.name);
        self.client
            .create_object("/api/admin/orgs", media_types::ADMIN_ORG, params)
            .await
    }

    /// 更新组织属性
    pub async fn update(&self, org: &OrgHandle, desired: &Org) -> Result<Option<Task>> {
        info!("更新组织: {}", org.href());
        let submission = self
            .client
            .update_object(org.href(), media_types::ADMIN_ORG, desired)
            .await?;
        expect_present(org.href(), submission)
    }

    /// 启用组织
    pub async fn enable(&self, org: &OrgHandle) -> Result<Option<Task>> {
        info!("启用组织: {}", org.href());
        let submission = self.client.post_action(org.href(), "enable", None).await?;
        expect_present(org.href(), submission)
    }

    /// 禁用组织
    pub async fn disable(&self, org: &OrgHandle) -> Result<Option<Task>> {
        info!("禁用组织: {}", org.href());
        let submission = self.client.post_action(org.href(), "disable", None).await?;
        expect_present(org.href(), submission)
    }

    /// 删除组织，已不存在时返回 `None`
    ///
    /// 需要删除非空组织时使用 `VcdClient::orchestrator`。
    pub async fn delete(
        &self,
        org: &OrgHandle,
        force: bool,
        recursive: bool,
    ) -> Result<Option<Task>> {
        info!("删除组织: {}", org.href());
        Ok(self
            .client
            .delete_object(org.href(), force, recursive)
            .await?
            .into_task())
    }
}
