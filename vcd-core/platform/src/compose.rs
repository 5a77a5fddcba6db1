//! vApp 组合
//!
//! 把虚拟机模板和网络组装成 vApp（composeVApp），或向已有 vApp 追加
//! 虚拟机与网络（recomposeVApp）。请求在本地完成全部校验后才会发送：
//! 每个网卡引用的网络必须已在 vApp 中声明，连接索引按输入顺序从 0 分配，
//! 主网卡索引单独记录在每台虚拟机的网络连接段中。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vcd_transport::{Method, Request};

use crate::client::VcdClient;
use crate::error::{CompositionError, RefreshError, VcdError};
use crate::handle::{ObjectKind, VAppHandle, VdcHandle};
use crate::models::{
    media_types, FenceMode, IpAllocationMode, NetworkConnection, NetworkConnectionSection,
    Reference, VApp,
};
use crate::task::Task;

fn default_connected() -> bool {
    true
}

/// 虚拟机网卡与 vApp 网络的绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachment {
    /// vApp 网络名称
    pub network: String,

    /// 是否为主网卡
    #[serde(default)]
    pub is_primary: bool,

    #[serde(default)]
    pub ip_allocation_mode: IpAllocationMode,

    /// 手动分配模式下的地址
    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub adapter_type: Option<String>,

    #[serde(default = "default_connected")]
    pub connected: bool,
}

impl NetworkAttachment {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_string(),
            is_primary: false,
            ip_allocation_mode: IpAllocationMode::default(),
            ip_address: None,
            adapter_type: None,
            connected: true,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn mode(mut self, mode: IpAllocationMode) -> Self {
        self.ip_allocation_mode = mode;
        self
    }

    /// 手动指定地址
    pub fn manual(mut self, ip: &str) -> Self {
        self.ip_allocation_mode = IpAllocationMode::Manual;
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn adapter(mut self, adapter_type: &str) -> Self {
        self.adapter_type = Some(adapter_type.to_string());
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }
}

/// 待加入 vApp 的虚拟机
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSource {
    pub name: String,

    /// 模板虚拟机 href
    pub source_href: String,

    #[serde(default)]
    pub computer_name: Option<String>,

    /// 网卡，按顺序分配连接索引
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
}

impl VmSource {
    pub fn new(name: &str, source_href: &str) -> Self {
        Self {
            name: name.to_string(),
            source_href: source_href.to_string(),
            computer_name: None,
            networks: Vec::new(),
        }
    }

    pub fn computer_name(mut self, computer_name: &str) -> Self {
        self.computer_name = Some(computer_name.to_string());
        self
    }

    pub fn attach(mut self, attachment: NetworkAttachment) -> Self {
        self.networks.push(attachment);
        self
    }
}

/// vApp 网络声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VAppNetworkSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub fence_mode: FenceMode,

    /// 桥接或 NAT 模式下的父网络
    #[serde(default)]
    pub parent_network: Option<Reference>,
}

impl VAppNetworkSpec {
    pub fn isolated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            fence_mode: FenceMode::Isolated,
            parent_network: None,
        }
    }

    pub fn bridged(name: &str, parent: Reference) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            fence_mode: FenceMode::Bridged,
            parent_network: Some(parent),
        }
    }
}

/// 组合请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRequest {
    /// vApp 名称，重组时可留空沿用原名
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub networks: Vec<VAppNetworkSpec>,

    #[serde(default)]
    pub vms: Vec<VmSource>,

    #[serde(default)]
    pub deploy: bool,

    #[serde(default)]
    pub power_on: bool,
}

impl CompositionRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            networks: Vec::new(),
            vms: Vec::new(),
            deploy: false,
            power_on: false,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn network(mut self, network: VAppNetworkSpec) -> Self {
        self.networks.push(network);
        self
    }

    pub fn vm(mut self, vm: VmSource) -> Self {
        self.vms.push(vm);
        self
    }

    pub fn deploy(mut self, deploy: bool) -> Self {
        self.deploy = deploy;
        self
    }

    pub fn power_on(mut self, power_on: bool) -> Self {
        self.power_on = power_on;
        self
    }
}

// ============================================
// 请求体
// ============================================

/// composeVApp / recomposeVApp 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposePayload {
    pub name: String,
    pub description: String,
    pub deploy: bool,
    pub power_on: bool,
    pub instantiation_params: InstantiationParams,
    pub sourced_item: Vec<SourcedItem>,
    #[serde(rename = "allEULAsAccepted")]
    pub all_eulas_accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantiationParams {
    pub network_config_section: NetworkConfigSection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfigSection {
    pub network_config: Vec<VAppNetworkConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VAppNetworkConfig {
    pub network_name: String,
    pub description: String,
    pub configuration: NetworkConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    pub fence_mode: FenceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_network: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcedItem {
    pub source: Reference,
    pub vm_general_params: VmGeneralParams,
    pub instantiation_params: VmInstantiationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmGeneralParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmInstantiationParams {
    pub network_connection_section: NetworkConnectionSection,
}

impl ComposePayload {
    /// 校验请求并生成请求体
    ///
    /// `existing_networks`/`existing_vms` 为重组目标 vApp 中已有的网络和虚拟机名称，
    /// 已有的网络不会重复声明。
    pub fn build(
        request: &CompositionRequest,
        existing_networks: &[String],
        existing_vms: &[String],
    ) -> Result<Self, CompositionError> {
        validate_networks(&request.networks)?;

        let mut declared: HashSet<&str> = existing_networks.iter().map(String::as_str).collect();
        declared.extend(request.networks.iter().map(|n| n.name.as_str()));

        let mut vm_names: HashSet<&str> = existing_vms.iter().map(String::as_str).collect();
        let mut sourced_item = Vec::with_capacity(request.vms.len());
        for vm in &request.vms {
            if vm.name.trim().is_empty() {
                return Err(CompositionError::Malformed("虚拟机名称为空".to_string()));
            }
            if !vm_names.insert(vm.name.as_str()) {
                return Err(CompositionError::Malformed(format!("虚拟机名称重复: {}", vm.name)));
            }
            if vm.source_href.trim().is_empty() {
                return Err(CompositionError::Malformed(format!(
                    "虚拟机 {} 未指定模板",
                    vm.name
                )));
            }

            let section = resolve_connections(&vm.name, &vm.networks, &declared)?;
            sourced_item.push(SourcedItem {
                source: Reference::new(&vm.source_href, &vm.name),
                vm_general_params: VmGeneralParams {
                    name: vm.name.clone(),
                    computer_name: vm.computer_name.clone(),
                },
                instantiation_params: VmInstantiationParams {
                    network_connection_section: section,
                },
            });
        }

        let existing: HashSet<&str> = existing_networks.iter().map(String::as_str).collect();
        let network_config = request
            .networks
            .iter()
            .filter(|n| !existing.contains(n.name.as_str()))
            .map(|n| VAppNetworkConfig {
                network_name: n.name.clone(),
                description: n.description.clone(),
                configuration: NetworkConfiguration {
                    fence_mode: n.fence_mode,
                    parent_network: n.parent_network.clone(),
                },
            })
            .collect();

        Ok(Self {
            name: request.name.clone(),
            description: request.description.clone(),
            deploy: request.deploy,
            power_on: request.power_on,
            instantiation_params: InstantiationParams {
                network_config_section: NetworkConfigSection { network_config },
            },
            sourced_item,
            all_eulas_accepted: true,
        })
    }
}

fn validate_networks(networks: &[VAppNetworkSpec]) -> Result<(), CompositionError> {
    let mut names = HashSet::new();
    for network in networks {
        if network.name.trim().is_empty() {
            return Err(CompositionError::Malformed("网络名称为空".to_string()));
        }
        if !names.insert(network.name.as_str()) {
            return Err(CompositionError::Malformed(format!(
                "网络名称重复: {}",
                network.name
            )));
        }
        if network.fence_mode != FenceMode::Isolated && network.parent_network.is_none() {
            return Err(CompositionError::Malformed(format!(
                "网络 {} 需要父网络",
                network.name
            )));
        }
    }
    Ok(())
}

/// 为一台虚拟机的网卡分配连接索引和主网卡索引
pub(crate) fn resolve_connections(
    vm: &str,
    attachments: &[NetworkAttachment],
    declared: &HashSet<&str>,
) -> Result<NetworkConnectionSection, CompositionError> {
    let mut primary = None;
    let mut connections = Vec::with_capacity(attachments.len());

    for (index, attachment) in attachments.iter().enumerate() {
        if !declared.contains(attachment.network.as_str()) {
            return Err(CompositionError::NetworkNotAttached {
                network: attachment.network.clone(),
                vm: vm.to_string(),
            });
        }
        if attachment.ip_allocation_mode == IpAllocationMode::Manual
            && attachment.ip_address.as_deref().map_or(true, str::is_empty)
        {
            return Err(CompositionError::Malformed(format!(
                "虚拟机 {} 的网卡 {} 为手动分配但未指定地址",
                vm, attachment.network
            )));
        }

        let index = index as u32;
        if attachment.is_primary {
            if primary.is_some() {
                return Err(CompositionError::Malformed(format!(
                    "虚拟机 {} 有多个主网卡",
                    vm
                )));
            }
            primary = Some(index);
        }

        connections.push(NetworkConnection {
            network: attachment.network.clone(),
            network_connection_index: index,
            is_connected: attachment.connected,
            ip_address_allocation_mode: attachment.ip_allocation_mode,
            ip_address: attachment.ip_address.clone(),
            network_adapter_type: attachment.adapter_type.clone(),
            mac_address: None,
        });
    }

    let primary_network_connection_index = if connections.is_empty() {
        None
    } else {
        Some(primary.unwrap_or(0))
    };

    Ok(NetworkConnectionSection {
        primary_network_connection_index,
        network_connection: connections,
    })
}

/// 组合目标
#[derive(Debug, Clone, Copy)]
pub enum CompositionTarget<'h> {
    /// 在虚拟数据中心中创建新 vApp
    Create(&'h VdcHandle),
    /// 向已有 vApp 追加虚拟机与网络
    Update(&'h VAppHandle),
}

/// vApp 组合器
#[derive(Clone, Copy)]
pub struct Composer<'a> {
    client: &'a VcdClient,
}

impl<'a> Composer<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 组合或重组 vApp，返回 vApp 句柄和远端任务
    pub async fn compose_vapp(
        &self,
        target: CompositionTarget<'_>,
        request: CompositionRequest,
    ) -> Result<(VAppHandle, Task), CompositionError> {
        match target {
            CompositionTarget::Create(vdc) => self.compose(vdc, &request).await,
            CompositionTarget::Update(vapp) => self.recompose(vapp, &request).await,
        }
    }

    async fn compose(
        &self,
        vdc: &VdcHandle,
        request: &CompositionRequest,
    ) -> Result<(VAppHandle, Task), CompositionError> {
        if request.name.trim().is_empty() {
            return Err(CompositionError::Malformed("vApp 名称为空".to_string()));
        }
        let payload = ComposePayload::build(request, &[], &[])?;
        if vdc.href().is_empty() {
            return Err(RefreshError::NotInitialized(ObjectKind::Vdc).into());
        }

        info!("组合 vApp: {} ({} 台虚拟机)", request.name, request.vms.len());
        let path = format!("{}/action/composeVApp", vdc.href());
        let body = self
            .submit(&path, media_types::COMPOSE_VAPP_PARAMS, &payload)
            .await?;

        let vapp: VApp = serde_json::from_str(&body)
            .map_err(|e| CompositionError::Submit(Box::new(VcdError::Parse(e.to_string()))))?;
        let handle = VAppHandle::from_snapshot(self.client.transport(), vapp);
        let task = handle
            .snapshot()
            .and_then(|s| s.tasks.first().cloned())
            .map(|t| Task::from_snapshot(self.client.transport(), t))
            .ok_or_else(|| CompositionError::MissingTask(path.clone()))?;

        Ok((handle, task))
    }

    async fn recompose(
        &self,
        vapp: &VAppHandle,
        request: &CompositionRequest,
    ) -> Result<(VAppHandle, Task), CompositionError> {
        // 先按缓存快照校验，校验失败不访问远端
        if let Some(cached) = vapp.snapshot() {
            let (networks, vms) = existing_names(cached);
            ComposePayload::build(request, &networks, &vms)?;
        }

        let mut current = vapp.clone();
        current.refresh().await?;

        let mut pending = current.pending_tasks();
        if !pending.is_empty() {
            info!("等待 vApp {} 的 {} 个未完成任务", current.href(), pending.len());
            self.client
                .tracker()
                .await_all(&mut pending, self.client.config().task.timeout())
                .await
                .map_err(CompositionError::PendingTask)?;
            current.refresh().await?;
        }

        let snapshot = current
            .snapshot()
            .ok_or(RefreshError::NotInitialized(ObjectKind::VApp))?;
        let (networks, vms) = existing_names(snapshot);
        let mut payload = ComposePayload::build(request, &networks, &vms)?;
        if payload.name.is_empty() {
            payload.name = snapshot.name.clone();
        }

        info!("重组 vApp: {} (追加 {} 台虚拟机)", current.href(), request.vms.len());
        let path = format!("{}/action/recomposeVApp", current.href());
        let body = self
            .submit(&path, media_types::RECOMPOSE_VAPP_PARAMS, &payload)
            .await?;
        let task = self
            .client
            .extract_task(&body)
            .map_err(|e| CompositionError::Submit(Box::new(e)))?
            .ok_or_else(|| CompositionError::MissingTask(path.clone()))?;

        if let Err(e) = current.refresh().await {
            warn!("重组后刷新 vApp {} 失败: {}", current.href(), e);
        }
        Ok((current, task))
    }

    /// 提交请求体，仅对可重试错误重试
    async fn submit(
        &self,
        path: &str,
        media_type: &str,
        payload: &ComposePayload,
    ) -> Result<String, CompositionError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| CompositionError::Malformed(e.to_string()))?;
        let request = Request::new(Method::POST, path)
            .with_header("Content-Type", media_type)
            .with_body(body);

        let client = self.client;
        let response = client
            .retry_policy()
            .retry(client.config().retry.timeout(), move || {
                let request = request.clone();
                async move { client.execute(request).await.map_err(VcdError::classify) }
            })
            .await
            .map_err(|e| CompositionError::Submit(Box::new(VcdError::from(e))))?;
        Ok(response.body)
    }
}

fn existing_names(vapp: &VApp) -> (Vec<String>, Vec<String>) {
    let networks = vapp.network_names().map(str::to_string).collect();
    let vms = vapp.vms.iter().map(|vm| vm.name.clone()).collect();
    (networks, vms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared<'a>(names: &[&'a str]) -> HashSet<&'a str> {
        names.iter().copied().collect()
    }

    #[test]
    fn test_connection_indices_follow_input_order() {
        let attachments = vec![
            NetworkAttachment::new("net-a"),
            NetworkAttachment::new("net-b").primary(),
            NetworkAttachment::new("net-a").mode(IpAllocationMode::Dhcp),
        ];
        let section =
            resolve_connections("vm-1", &attachments, &declared(&["net-a", "net-b"])).unwrap();

        let indices: Vec<u32> = section
            .network_connection
            .iter()
            .map(|c| c.network_connection_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(section.primary_network_connection_index, Some(1));
    }

    #[test]
    fn test_no_attachments_no_primary() {
        let section = resolve_connections("vm-1", &[], &declared(&[])).unwrap();
        assert!(section.network_connection.is_empty());
        assert_eq!(section.primary_network_connection_index, None);
    }

    #[test]
    fn test_multiple_primary_rejected() {
        let attachments = vec![
            NetworkAttachment::new("net-a").primary(),
            NetworkAttachment::new("net-a").primary(),
        ];
        let err = resolve_connections("vm-1", &attachments, &declared(&["net-a"])).unwrap_err();
        assert!(matches!(err, CompositionError::Malformed(_)));
    }

    #[test]
    fn test_manual_mode_requires_address() {
        let mut attachment = NetworkAttachment::new("net-a");
        attachment.ip_allocation_mode = IpAllocationMode::Manual;
        let err = resolve_connections("vm-1", &[attachment], &declared(&["net-a"])).unwrap_err();
        assert!(matches!(err, CompositionError::Malformed(_)));

        let ok = resolve_connections(
            "vm-1",
            &[NetworkAttachment::new("net-a").manual("10.0.0.5")],
            &declared(&["net-a"]),
        )
        .unwrap();
        assert_eq!(ok.network_connection[0].ip_address.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_build_rejects_duplicate_vm_names() {
        let request = CompositionRequest::new("web")
            .network(VAppNetworkSpec::isolated("net-a"))
            .vm(VmSource::new("web-1", "/api/vAppTemplate/vm-t"))
            .vm(VmSource::new("web-1", "/api/vAppTemplate/vm-t"));
        let err = ComposePayload::build(&request, &[], &[]).unwrap_err();
        assert!(matches!(err, CompositionError::Malformed(_)));
    }

    #[test]
    fn test_build_skips_existing_networks() {
        let request = CompositionRequest::new("web")
            .network(VAppNetworkSpec::isolated("net-a"))
            .network(VAppNetworkSpec::isolated("net-b"))
            .vm(
                VmSource::new("web-2", "/api/vAppTemplate/vm-t")
                    .attach(NetworkAttachment::new("net-a")),
            );
        let existing_networks = vec!["net-a".to_string()];
        let existing_vms = vec!["web-1".to_string()];
        let payload = ComposePayload::build(&request, &existing_networks, &existing_vms).unwrap();

        let names: Vec<&str> = payload
            .instantiation_params
            .network_config_section
            .network_config
            .iter()
            .map(|n| n.network_name.as_str())
            .collect();
        assert_eq!(names, vec!["net-b"]);
    }

    #[test]
    fn test_bridged_network_requires_parent() {
        let mut spec = VAppNetworkSpec::isolated("net-a");
        spec.fence_mode = FenceMode::Bridged;
        let request = CompositionRequest::new("web").network(spec);
        assert!(matches!(
            ComposePayload::build(&request, &[], &[]),
            Err(CompositionError::Malformed(_))
        ));
    }

    #[test]
    fn test_payload_wire_format() {
        let request = CompositionRequest::new("web")
            .network(VAppNetworkSpec::bridged("net-a", Reference::new("/api/network/1", "ext")))
            .vm(
                VmSource::new("web-1", "/api/vAppTemplate/vm-t")
                    .attach(NetworkAttachment::new("net-a")),
            )
            .power_on(true);
        let payload = ComposePayload::build(&request, &[], &[]).unwrap();
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["powerOn"], true);
        assert_eq!(value["allEULAsAccepted"], true);
        let network = &value["instantiationParams"]["networkConfigSection"]["networkConfig"][0];
        assert_eq!(network["configuration"]["fenceMode"], "bridged");
        let section = &value["sourcedItem"][0]["instantiationParams"]["networkConnectionSection"];
        assert_eq!(section["primaryNetworkConnectionIndex"], 0);
        assert_eq!(section["networkConnection"][0]["ipAddressAllocationMode"], "POOL");
    }
}
