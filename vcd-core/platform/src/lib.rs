//! VCD 云管理平台编排核心
//!
//! 管理 组织 → 虚拟数据中心 → vApp → 虚拟机 → 网络 的层级对象生命周期。
//! 远端平台上所有修改操作都是异步的：请求返回一个任务句柄，需要轮询到终态。
//!
//! # 功能
//!
//! - **对象句柄** (`ObjectHandle`): 远端对象的缓存快照与刷新
//! - **任务跟踪** (`TaskTracker`): 轮询异步任务直到终态或超时
//! - **重试策略** (`RetryPolicy`): 区分可重试与致命错误的有界重试
//! - **vApp 组合** (`Composer`): 组装虚拟机与网络，校验网络归属和主网卡索引
//! - **级联删除** (`Orchestrator`): 按依赖顺序删除组织/虚拟数据中心子树
//! - **对象管理** (`OrgApi`/`VdcApi`/`VAppApi`/`VmApi`/`NetworkApi`/`CatalogApi`)
//!
//! # 示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use vcd_platform::{VcdClient, PlatformConfig, CompositionRequest, CompositionTarget};
//!
//! let client = VcdClient::new(transport, PlatformConfig::default());
//!
//! let vdc = client.vdc().get("https://vcd/api/vdc/1").await?;
//! let request = CompositionRequest::new("web")
//!     .network(VAppNetworkSpec::isolated("net-a"))
//!     .vm(VmSource::new("web-1", template_href).attach(NetworkAttachment::new("net-a")));
//! let (vapp, mut task) = client.composer()
//!     .compose_vapp(CompositionTarget::Create(&vdc), request)
//!     .await?;
//! client.tracker().await_completion(&mut task, timeout).await?;
//!
//! // 强制递归删除整个组织
//! let org = client.org().find_by_name("acme").await?;
//! client.orchestrator().delete_subtree(org.into(), true, true).await?;
//! ```

pub mod api;
pub mod cascade;
pub mod client;
pub mod clock;
pub mod compose;
pub mod config;
pub mod error;
pub mod handle;
pub mod models;
pub mod retry;
pub mod task;

pub use client::{Submission, VcdClient};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{DeletionConfig, PlatformConfig, RetryConfig, TaskConfig};
pub use error::{CompositionError, DeletionError, RefreshError, Result, TaskError, VcdError};
pub use handle::{
    CatalogHandle, NetworkHandle, ObjectHandle, ObjectKind, ObjectRef, OrgHandle, Refreshable,
    Resource, VAppHandle, VdcHandle, VmHandle,
};
pub use retry::{Attempt, RetryError, RetryPolicy};
pub use task::{Task, TaskStatus, TaskTracker};

// 导出 API 模块
pub use api::{
    catalog::CatalogApi, network::NetworkApi, org::OrgApi, vapp::VAppApi, vdc::VdcApi, vm::VmApi,
};

// 导出组合与删除
pub use cascade::{
    DeletionPlan, DeletionPlanner, DeletionReport, DeletionStep, Orchestrator, StepAction, Subtree,
    SubtreeRoot, VAppEntry,
};
pub use compose::{
    ComposePayload, Composer, CompositionRequest, CompositionTarget, NetworkAttachment,
    VAppNetworkSpec, VmSource,
};

// 导出数据模型
pub use models::{
    Catalog, CreateCatalogParams, CreateOrgParams, CreateVdcParams, ErrorDetail, FenceMode,
    IpAllocationMode, NetworkConnection, NetworkConnectionSection, Org, OrgVdcNetwork, Reference,
    TaskSnapshot, VApp, VAppNetwork, Vdc, Vm,
};
