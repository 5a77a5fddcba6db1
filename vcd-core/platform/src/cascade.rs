//! 级联删除
//!
//! 先获取组织或虚拟数据中心子树，由 `DeletionPlanner` 生成有序删除计划，
//! 再由 `Orchestrator` 逐步执行。每一步在重试时限内提交并等待任务结束，
//! 已不存在的目标视为完成，因此中途失败后可以安全地重新执行。

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::{Submission, VcdClient};
use crate::error::{DeletionError, Result, VcdError};
use crate::handle::{ObjectHandle, ObjectKind, ObjectRef, OrgHandle, Resource, VdcHandle};
use crate::models::{media_types, Org, Reference, VApp, Vdc};

/// 删除步骤动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// 关机并取消部署
    Undeploy,
    /// 禁用
    Disable,
    /// 删除
    Delete,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undeploy => "undeploy",
            Self::Disable => "disable",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// 删除计划中的一步
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionStep {
    pub action: StepAction,
    pub target: ObjectRef,
    /// 仅对 `Delete` 有意义
    pub force: bool,
    pub recursive: bool,
}

impl DeletionStep {
    fn undeploy(target: ObjectRef) -> Self {
        Self {
            action: StepAction::Undeploy,
            target,
            force: false,
            recursive: false,
        }
    }

    fn disable(target: ObjectRef) -> Self {
        Self {
            action: StepAction::Disable,
            target,
            force: false,
            recursive: false,
        }
    }

    fn delete(target: ObjectRef, force: bool, recursive: bool) -> Self {
        Self {
            action: StepAction::Delete,
            target,
            force,
            recursive,
        }
    }
}

impl fmt::Display for DeletionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.target)?;
        if self.action == StepAction::Delete {
            write!(f, " (force={}, recursive={})", self.force, self.recursive)?;
        }
        Ok(())
    }
}

/// 有序删除计划
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    pub root: ObjectRef,
    pub steps: Vec<DeletionStep>,
}

/// 子树中的 vApp
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VAppEntry {
    pub reference: ObjectRef,
    pub deployed: bool,
}

/// 待删除的子树
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtree {
    pub root: ObjectRef,
    pub vapps: Vec<VAppEntry>,
    pub catalogs: Vec<ObjectRef>,
    /// 根对象直属的网络
    pub networks: Vec<ObjectRef>,
    /// 组织下的虚拟数据中心
    pub vdcs: Vec<Subtree>,
}

impl Subtree {
    pub fn new(root: ObjectRef) -> Self {
        Self {
            root,
            vapps: Vec::new(),
            catalogs: Vec::new(),
            networks: Vec::new(),
            vdcs: Vec::new(),
        }
    }

    /// 直接子对象数量
    pub fn child_count(&self) -> usize {
        self.vapps.len() + self.catalogs.len() + self.networks.len() + self.vdcs.len()
    }

    /// 子树中全部 vApp
    fn all_vapps(&self) -> impl Iterator<Item = &VAppEntry> {
        self.vapps
            .iter()
            .chain(self.vdcs.iter().flat_map(|vdc| vdc.vapps.iter()))
    }
}

/// 删除计划生成
pub struct DeletionPlanner;

impl DeletionPlanner {
    /// 由子树生成删除计划
    ///
    /// - 非递归: 子树非空时拒绝，否则禁用并删除根对象
    /// - 递归非强制: 禁用根对象并交给远端递归删除，有运行中的子对象时远端会拒绝
    /// - 递归强制: 取消部署 vApp → 删除 vApp → 删除目录 → 删除网络 →
    ///   禁用并删除虚拟数据中心 → 禁用并删除根对象
    pub fn plan(
        subtree: &Subtree,
        force: bool,
        recursive: bool,
    ) -> std::result::Result<DeletionPlan, DeletionError> {
        let root = subtree.root.clone();

        if !recursive {
            let children = subtree.child_count();
            if children > 0 {
                return Err(DeletionError::HasChildren {
                    root: root.to_string(),
                    children,
                });
            }
            return Ok(DeletionPlan {
                steps: vec![
                    DeletionStep::disable(root.clone()),
                    DeletionStep::delete(root.clone(), force, false),
                ],
                root,
            });
        }

        if !force {
            return Ok(DeletionPlan {
                steps: vec![
                    DeletionStep::disable(root.clone()),
                    DeletionStep::delete(root.clone(), false, true),
                ],
                root,
            });
        }

        let mut steps = Vec::new();
        steps.extend(
            subtree
                .all_vapps()
                .filter(|v| v.deployed)
                .map(|v| DeletionStep::undeploy(v.reference.clone())),
        );
        steps.extend(
            subtree
                .all_vapps()
                .map(|v| DeletionStep::delete(v.reference.clone(), true, false)),
        );
        steps.extend(
            subtree
                .catalogs
                .iter()
                .map(|c| DeletionStep::delete(c.clone(), true, true)),
        );
        steps.extend(
            subtree
                .networks
                .iter()
                .chain(subtree.vdcs.iter().flat_map(|vdc| vdc.networks.iter()))
                .map(|n| DeletionStep::delete(n.clone(), true, false)),
        );
        for vdc in &subtree.vdcs {
            steps.push(DeletionStep::disable(vdc.root.clone()));
            steps.push(DeletionStep::delete(vdc.root.clone(), true, true));
        }
        steps.push(DeletionStep::disable(root.clone()));
        steps.push(DeletionStep::delete(root.clone(), true, true));

        Ok(DeletionPlan { root, steps })
    }
}

/// 删除结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub root: ObjectRef,
    /// 已执行的步骤
    pub executed: Vec<DeletionStep>,
    /// 目标已不存在而跳过的步骤
    pub skipped: Vec<DeletionStep>,
    /// 根对象在开始前已不存在
    pub already_absent: bool,
}

impl DeletionReport {
    fn absent(root: ObjectRef) -> Self {
        Self {
            root,
            executed: Vec::new(),
            skipped: Vec::new(),
            already_absent: true,
        }
    }
}

/// 删除子树的根
#[derive(Debug, Clone)]
pub enum SubtreeRoot {
    Org(OrgHandle),
    Vdc(VdcHandle),
}

impl SubtreeRoot {
    pub fn href(&self) -> &str {
        match self {
            Self::Org(h) => h.href(),
            Self::Vdc(h) => h.href(),
        }
    }

    pub fn as_ref(&self) -> ObjectRef {
        match self {
            Self::Org(h) => h.as_ref(),
            Self::Vdc(h) => h.as_ref(),
        }
    }
}

impl From<OrgHandle> for SubtreeRoot {
    fn from(handle: OrgHandle) -> Self {
        Self::Org(handle)
    }
}

impl From<VdcHandle> for SubtreeRoot {
    fn from(handle: VdcHandle) -> Self {
        Self::Vdc(handle)
    }
}

/// 级联删除编排器
#[derive(Clone, Copy)]
pub struct Orchestrator<'a> {
    client: &'a VcdClient,
}

impl<'a> Orchestrator<'a> {
    pub(crate) fn new(client: &'a VcdClient) -> Self {
        Self { client }
    }

    /// 删除整个子树
    pub async fn delete_subtree(
        &self,
        root: SubtreeRoot,
        force: bool,
        recursive: bool,
    ) -> std::result::Result<DeletionReport, DeletionError> {
        info!(
            "删除 {} (force={}, recursive={})",
            root.as_ref(),
            force,
            recursive
        );
        match self.plan_subtree(&root, force, recursive).await? {
            Some(plan) => self.execute(&plan).await,
            None => {
                info!("{} 已不存在", root.as_ref());
                Ok(DeletionReport::absent(root.as_ref()))
            }
        }
    }

    /// 只生成删除计划，不做任何修改；根对象不存在时返回 `None`
    pub async fn plan_subtree(
        &self,
        root: &SubtreeRoot,
        force: bool,
        recursive: bool,
    ) -> std::result::Result<Option<DeletionPlan>, DeletionError> {
        let subtree = self
            .fetch_subtree(root)
            .await
            .map_err(|e| DeletionError::Planning(Box::new(e)))?;
        subtree
            .map(|s| DeletionPlanner::plan(&s, force, recursive))
            .transpose()
    }

    /// 获取子树，根对象不存在时返回 `None`
    pub async fn fetch_subtree(&self, root: &SubtreeRoot) -> Result<Option<Subtree>> {
        match root {
            SubtreeRoot::Org(org) => self.fetch_org_subtree(org.href()).await,
            SubtreeRoot::Vdc(vdc) => self.fetch_vdc_subtree(vdc.href()).await,
        }
    }

    async fn fetch_org_subtree(&self, href: &str) -> Result<Option<Subtree>> {
        let org = match self.load::<Org>(href).await? {
            Some(org) => org,
            None => return Ok(None),
        };
        let snapshot = org.require_initialized()?;

        let mut subtree = Subtree::new(org.as_ref());
        subtree.catalogs = refs(ObjectKind::Catalog, &snapshot.catalogs);
        subtree.networks = refs(ObjectKind::Network, &snapshot.networks);
        for vdc in &snapshot.vdcs {
            match self.fetch_vdc_subtree(&vdc.href).await? {
                Some(child) => subtree.vdcs.push(child),
                None => warn!("虚拟数据中心 {} 已不存在，跳过", vdc.href),
            }
        }
        Ok(Some(subtree))
    }

    async fn fetch_vdc_subtree(&self, href: &str) -> Result<Option<Subtree>> {
        let vdc = match self.load::<Vdc>(href).await? {
            Some(vdc) => vdc,
            None => return Ok(None),
        };
        let snapshot = vdc.require_initialized()?;

        let mut subtree = Subtree::new(vdc.as_ref());
        subtree.networks = refs(ObjectKind::Network, &snapshot.networks);
        for reference in &snapshot.vapps {
            if let Some(vapp) = self.load::<VApp>(&reference.href).await? {
                let deployed = vapp.snapshot().map(|s| s.deployed).unwrap_or(false);
                subtree.vapps.push(VAppEntry {
                    reference: vapp.as_ref(),
                    deployed,
                });
            }
        }
        Ok(Some(subtree))
    }

    /// 获取对象，不存在时返回 `None`
    async fn load<S: Resource>(&self, href: &str) -> Result<Option<ObjectHandle<S>>> {
        let client = self.client;
        let result = client
            .retry_policy()
            .retry(client.config().retry.timeout(), move || async move {
                client.fetch::<S>(href).await.map_err(VcdError::classify)
            })
            .await
            .map_err(VcdError::from);
        match result {
            Ok(handle) => Ok(Some(handle)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 按顺序执行删除计划，遇到致命错误立即停止
    pub async fn execute(
        &self,
        plan: &DeletionPlan,
    ) -> std::result::Result<DeletionReport, DeletionError> {
        let total = plan.steps.len();
        let mut report = DeletionReport {
            root: plan.root.clone(),
            executed: Vec::new(),
            skipped: Vec::new(),
            already_absent: false,
        };

        for (index, step) in plan.steps.iter().enumerate() {
            let label = format!("删除计划第 {}/{} 步: {}", index + 1, total, step);
            match self.run_step(&label, step).await {
                Ok(Submission::Absent) => {
                    info!("{} 已不存在，跳过", step.target);
                    report.skipped.push(step.clone());
                }
                Ok(_) => report.executed.push(step.clone()),
                Err(e) if e.is_not_found() => {
                    info!("{} 已不存在，跳过", step.target);
                    report.skipped.push(step.clone());
                }
                Err(e) => {
                    error!("{} 失败: {}", label, e);
                    return Err(DeletionError::StepFailed {
                        step: index + 1,
                        action: step.action,
                        object: step.target.href.clone(),
                        cause: Box::new(e),
                    });
                }
            }
        }

        info!(
            "{} 删除完成: 执行 {} 步, 跳过 {} 步",
            plan.root,
            report.executed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn run_step(&self, label: &str, step: &DeletionStep) -> Result<Submission> {
        let client = self.client;
        let budget = client.config().deletion.step_timeout();
        client
            .submit_and_wait_within(label, budget, budget, || submit_step(client, step))
            .await
    }
}

async fn submit_step(client: &VcdClient, step: &DeletionStep) -> Result<Submission> {
    let href = step.target.href.as_str();
    match step.action {
        StepAction::Undeploy => {
            let body = serde_json::json!({ "undeployPowerAction": "powerOff" }).to_string();
            client
                .post_action(href, "undeploy", Some((media_types::UNDEPLOY_PARAMS, body)))
                .await
        }
        StepAction::Disable => client.post_action(href, "disable", None).await,
        StepAction::Delete => client.delete_object(href, step.force, step.recursive).await,
    }
}

fn refs(kind: ObjectKind, references: &[Reference]) -> Vec<ObjectRef> {
    references
        .iter()
        .map(|r| ObjectRef::new(kind, &r.href, &r.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(kind: ObjectKind, href: &str) -> ObjectRef {
        ObjectRef::new(kind, href, "")
    }

    fn vdc_subtree() -> Subtree {
        let mut vdc = Subtree::new(obj(ObjectKind::Vdc, "/api/vdc/1"));
        vdc.vapps.push(VAppEntry {
            reference: obj(ObjectKind::VApp, "/api/vApp/1"),
            deployed: true,
        });
        vdc.vapps.push(VAppEntry {
            reference: obj(ObjectKind::VApp, "/api/vApp/2"),
            deployed: false,
        });
        vdc.networks.push(obj(ObjectKind::Network, "/api/network/1"));
        vdc
    }

    #[test]
    fn test_non_recursive_rejects_children() {
        let err = DeletionPlanner::plan(&vdc_subtree(), true, false).unwrap_err();
        assert!(matches!(err, DeletionError::HasChildren { children: 3, .. }));
    }

    #[test]
    fn test_non_recursive_empty_root() {
        let subtree = Subtree::new(obj(ObjectKind::Vdc, "/api/vdc/9"));
        let plan = DeletionPlanner::plan(&subtree, false, false).unwrap();
        let actions: Vec<StepAction> = plan.steps.iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![StepAction::Disable, StepAction::Delete]);
    }

    #[test]
    fn test_recursive_without_force_delegates_to_server() {
        let plan = DeletionPlanner::plan(&vdc_subtree(), false, true).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].action, StepAction::Delete);
        assert!(plan.steps[1].recursive);
        assert!(!plan.steps[1].force);
    }

    #[test]
    fn test_forced_org_plan_order() {
        let mut org = Subtree::new(obj(ObjectKind::Org, "/api/org/1"));
        org.catalogs.push(obj(ObjectKind::Catalog, "/api/catalog/1"));
        org.vdcs.push(vdc_subtree());

        let plan = DeletionPlanner::plan(&org, true, true).unwrap();
        let steps: Vec<(StepAction, &str)> = plan
            .steps
            .iter()
            .map(|s| (s.action, s.target.href.as_str()))
            .collect();

        assert_eq!(
            steps,
            vec![
                (StepAction::Undeploy, "/api/vApp/1"),
                (StepAction::Delete, "/api/vApp/1"),
                (StepAction::Delete, "/api/vApp/2"),
                (StepAction::Delete, "/api/catalog/1"),
                (StepAction::Delete, "/api/network/1"),
                (StepAction::Disable, "/api/vdc/1"),
                (StepAction::Delete, "/api/vdc/1"),
                (StepAction::Disable, "/api/org/1"),
                (StepAction::Delete, "/api/org/1"),
            ]
        );
    }
}
