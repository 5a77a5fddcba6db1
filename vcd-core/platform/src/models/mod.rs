//! 平台数据模型
//!
//! 远端对象的 JSON 表示（camelCase 字段）。所有集合字段在反序列化时整体生成，
//! 刷新句柄时以新快照整体替换旧快照。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::{ObjectKind, Resource};

/// 请求体媒体类型
pub mod media_types {
    pub const ADMIN_ORG: &str = "application/vnd.vmware.admin.organization+json";
    pub const VDC_PARAMS: &str = "application/vnd.vmware.admin.createVdcParams+json";
    pub const ADMIN_VDC: &str = "application/vnd.vmware.admin.vdc+json";
    pub const ORG_VDC_NETWORK: &str = "application/vnd.vmware.vcloud.orgVdcNetwork+json";
    pub const ADMIN_CATALOG: &str = "application/vnd.vmware.admin.catalog+json";
    pub const VAPP: &str = "application/vnd.vmware.vcloud.vApp+json";
    pub const VM: &str = "application/vnd.vmware.vcloud.vm+json";
    pub const COMPOSE_VAPP_PARAMS: &str = "application/vnd.vmware.vcloud.composeVAppParams+json";
    pub const RECOMPOSE_VAPP_PARAMS: &str =
        "application/vnd.vmware.vcloud.recomposeVAppParams+json";
    pub const DEPLOY_PARAMS: &str = "application/vnd.vmware.vcloud.deployVAppParams+json";
    pub const UNDEPLOY_PARAMS: &str = "application/vnd.vmware.vcloud.undeployVAppParams+json";
    pub const NETWORK_CONNECTION_SECTION: &str =
        "application/vnd.vmware.vcloud.networkConnectionSection+json";
}

/// 对象引用
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub href: String,

    pub name: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Reference {
    pub fn new(href: &str, name: &str) -> Self {
        Self {
            href: href.to_string(),
            name: name.to_string(),
            media_type: None,
        }
    }
}

/// 远端错误详情
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorDetail {
    pub message: String,

    pub major_error_code: Option<u16>,

    pub minor_error_code: Option<String>,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.minor_error_code, self.message.is_empty()) {
            (_, true) => write!(f, "(无错误详情)"),
            (Some(code), false) => write!(f, "{} [{}]", self.message, code),
            (None, false) => write!(f, "{}", self.message),
        }
    }
}

/// 任务表示
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSnapshot {
    pub href: String,

    /// 远端状态字符串 (queued/preRunning/running/success/error/canceled/aborted)
    pub status: String,

    /// 操作描述
    pub operation: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

// ============================================
// 组织
// ============================================

/// 组织
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Org {
    pub href: String,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub is_enabled: bool,

    /// 虚拟数据中心
    pub vdcs: Vec<Reference>,

    /// 目录
    pub catalogs: Vec<Reference>,

    /// 直属组织网络
    pub networks: Vec<Reference>,

    pub tasks: Vec<TaskSnapshot>,
}

/// 创建组织请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrgParams {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

impl CreateOrgParams {
    pub fn new(name: &str, full_name: &str) -> Self {
        Self {
            name: name.to_string(),
            full_name: full_name.to_string(),
            description: String::new(),
            is_enabled: true,
        }
    }
}

// ============================================
// 虚拟数据中心
// ============================================

/// 虚拟数据中心
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vdc {
    pub href: String,
    pub name: String,
    pub description: String,
    pub is_enabled: bool,
    pub allocation_model: String,

    /// vApp
    pub vapps: Vec<Reference>,

    /// 组织 VDC 网络
    pub networks: Vec<Reference>,

    pub tasks: Vec<TaskSnapshot>,
}

/// 创建虚拟数据中心请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVdcParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 分配模型 (AllocationVApp/AllocationPool/ReservationPool/Flex)
    pub allocation_model: String,
    pub provider_vdc_reference: Reference,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

impl CreateVdcParams {
    pub fn new(name: &str, provider_vdc: Reference) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            allocation_model: "AllocationVApp".to_string(),
            provider_vdc_reference: provider_vdc,
            is_enabled: true,
        }
    }
}

// ============================================
// vApp / 虚拟机
// ============================================

/// 网络隔离模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FenceMode {
    /// 桥接到父网络
    Bridged,
    /// 隔离网络
    #[default]
    Isolated,
    /// NAT 路由
    NatRouted,
}

/// IP 分配模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IpAllocationMode {
    /// 从网络 IP 池分配
    #[default]
    Pool,
    /// DHCP 获取
    Dhcp,
    /// 手动指定
    Manual,
    /// 不分配
    None,
}

/// vApp 内的网络
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VAppNetwork {
    pub name: String,
    pub description: String,
    pub fence_mode: FenceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_network: Option<Reference>,
}

/// vApp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VApp {
    pub href: String,
    pub name: String,
    pub description: String,

    /// 远端状态码 (4 = 运行中, 8 = 已关机)
    pub status: i32,

    /// 是否已部署
    pub deployed: bool,

    pub networks: Vec<VAppNetwork>,

    pub vms: Vec<Vm>,

    pub tasks: Vec<TaskSnapshot>,
}

impl VApp {
    /// 已加入 vApp 的网络名称
    pub fn network_names(&self) -> impl Iterator<Item = &str> {
        self.networks.iter().map(|n| n.name.as_str())
    }
}

/// 网卡连接
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConnection {
    pub network: String,
    pub network_connection_index: u32,
    pub is_connected: bool,
    pub ip_address_allocation_mode: IpAllocationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_adapter_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// 虚拟机网络连接段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConnectionSection {
    /// 主网卡索引，与各连接自身的索引字段相互独立
    pub primary_network_connection_index: Option<u32>,

    pub network_connection: Vec<NetworkConnection>,
}

/// 虚拟机
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vm {
    pub href: String,
    pub name: String,
    pub status: i32,
    pub deployed: bool,
    pub network_connection_section: NetworkConnectionSection,
    pub tasks: Vec<TaskSnapshot>,
}

// ============================================
// 网络 / 目录
// ============================================

/// 组织 VDC 网络
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrgVdcNetwork {
    pub href: String,
    pub name: String,
    pub description: String,
    pub fence_mode: FenceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_network: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    pub tasks: Vec<TaskSnapshot>,
}

/// 目录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Catalog {
    pub href: String,
    pub name: String,
    pub description: String,
    pub items: Vec<Reference>,
    pub tasks: Vec<TaskSnapshot>,
}

/// 创建目录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCatalogParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 查询服务返回的引用列表
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryReferences {
    pub total: u64,
    pub reference: Vec<Reference>,
}

fn default_enabled() -> bool {
    true
}

// ============================================
// Resource 实现
// ============================================

macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl Resource for $ty {
            const KIND: ObjectKind = $kind;

            fn href(&self) -> &str {
                &self.href
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn tasks(&self) -> &[TaskSnapshot] {
                &self.tasks
            }
        }
    };
}

impl_resource!(Org, ObjectKind::Org);
impl_resource!(Vdc, ObjectKind::Vdc);
impl_resource!(VApp, ObjectKind::VApp);
impl_resource!(Vm, ObjectKind::Vm);
impl_resource!(OrgVdcNetwork, ObjectKind::Network);
impl_resource!(Catalog, ObjectKind::Catalog);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vapp_deserialize() {
        let json = serde_json::json!({
            "href": "/api/vApp/vapp-1",
            "name": "web",
            "deployed": true,
            "networks": [{"name": "net-a", "fenceMode": "bridged"}],
            "vms": [{
                "href": "/api/vApp/vm-1",
                "name": "web-1",
                "networkConnectionSection": {
                    "primaryNetworkConnectionIndex": 0,
                    "networkConnection": [{
                        "network": "net-a",
                        "networkConnectionIndex": 0,
                        "isConnected": true,
                        "ipAddressAllocationMode": "DHCP"
                    }]
                }
            }],
            "tasks": [{"href": "/api/task/9", "status": "running"}]
        });

        let vapp: VApp = serde_json::from_value(json).unwrap();
        assert!(vapp.deployed);
        assert_eq!(vapp.network_names().collect::<Vec<_>>(), vec!["net-a"]);
        assert_eq!(vapp.networks[0].fence_mode, FenceMode::Bridged);
        let section = &vapp.vms[0].network_connection_section;
        assert_eq!(section.primary_network_connection_index, Some(0));
        assert_eq!(
            section.network_connection[0].ip_address_allocation_mode,
            IpAllocationMode::Dhcp
        );
        assert_eq!(vapp.tasks[0].status, "running");
    }

    #[test]
    fn test_missing_collections_default_empty() {
        let org: Org =
            serde_json::from_str(r#"{"href": "/api/admin/org/1", "name": "acme"}"#).unwrap();
        assert!(org.vdcs.is_empty());
        assert!(org.catalogs.is_empty());
        assert!(org.tasks.is_empty());
        assert_eq!(org.kind(), ObjectKind::Org);
    }

    #[test]
    fn test_ip_allocation_mode_wire_names() {
        let manual = serde_json::to_value(IpAllocationMode::Manual).unwrap();
        assert_eq!(manual, "MANUAL");
        let nat = serde_json::to_value(FenceMode::NatRouted).unwrap();
        assert_eq!(nat, "natRouted");
    }

    #[test]
    fn test_error_detail_display() {
        let detail = ErrorDetail {
            message: "disk full".to_string(),
            major_error_code: Some(500),
            minor_error_code: Some("INTERNAL".to_string()),
        };
        assert_eq!(detail.to_string(), "disk full [INTERNAL]");
        assert_eq!(ErrorDetail::default().to_string(), "(无错误详情)");
    }
}
