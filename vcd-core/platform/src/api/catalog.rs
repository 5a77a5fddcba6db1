//! 目录管理 API

use tracing::info;

use crate::api::expect_present;
use crate::client::VcdClient;
use crate::error::Result;
use crate::handle::{CatalogHandle, OrgHandle};
use crate::models::{media_types, Catalog, CreateCatalogParams};
use crate::task::Task;

/// 目录管理 API
#[derive(Clone, Copy)]
pub struct CatalogApi<'a> {
    client: &'a VcdClient,
}

impl<'a> CatalogApi<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, href: &str) -> Result<CatalogHandle> {
        info!("获取目录: {}", href);
        self.client.fetch(href).await
    }

    /// 在组织下创建目录
    pub async fn create(
        &self,
        org: &OrgHandle,
        params: &CreateCatalogParams,
    ) -> Result<(CatalogHandle, Option<Task>)> {
        info!("创建目录: {} (组织 {})", params.name, org.href());
        let path = format!("{}/catalogs", org.href());
        self.client
            .create_object(&path, media_types::ADMIN_CATALOG, params)
            .await
    }

    pub async fn update(&self, catalog: &CatalogHandle, desired: &Catalog) -> Result<Option<Task>> {
        info!("更新目录: {}", catalog.href());
        let submission = self
            .client
            .update_object(catalog.href(), media_types::ADMIN_CATALOG, desired)
            .await?;
        expect_present(catalog.href(), submission)
    }

    /// 删除目录，已不存在时返回 `None`
    pub async fn delete(
        &self,
        catalog: &CatalogHandle,
        force: bool,
        recursive: bool,
    ) -> Result<Option<Task>> {
        info!("删除目录: {}", catalog.href());
        Ok(self
            .client
            .delete_object(catalog.href(), force, recursive)
            .await?
            .into_task())
    }
}
