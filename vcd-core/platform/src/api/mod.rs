//! 平台对象管理 API
//!
//! 按对象类型划分：
//! - 组织管理 (OrgApi)
//! - 虚拟数据中心管理 (VdcApi)
//! - vApp 管理 (VAppApi)
//! - 虚拟机管理 (VmApi)
//! - 网络管理 (NetworkApi)
//! - 目录管理 (CatalogApi)

pub mod catalog;
pub mod network;
pub mod org;
pub mod vapp;
pub mod vdc;
pub mod vm;

pub use catalog::CatalogApi;
pub use network::NetworkApi;
pub use org::OrgApi;
pub use vapp::VAppApi;
pub use vdc::VdcApi;
pub use vm::VmApi;

use crate::client::Submission;
use crate::error::{Result, VcdError};
use crate::task::Task;

/// 修改已有对象的结果，目标不存在时报错
pub(crate) fn expect_present(href: &str, submission: Submission) -> Result<Option<Task>> {
    match submission {
        Submission::Task(task) => Ok(Some(task)),
        Submission::Completed => Ok(None),
        Submission::Absent => Err(VcdError::NotFound(href.to_string())),
    }
}
