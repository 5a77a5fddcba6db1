//! 远端对象句柄
//!
//! 句柄持有对象 href、最近一次获取的快照和共享的传输层。快照只会被
//! `refresh` 整体替换，不会被局部修改，因此多次刷新不会累积重复的子对象。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vcd_transport::{Request, Transport};

use crate::error::{RefreshError, VcdError};
use crate::models::{Catalog, Org, OrgVdcNetwork, TaskSnapshot, VApp, Vdc, Vm};
use crate::task::Task;

/// 对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Org,
    Vdc,
    VApp,
    Vm,
    Network,
    Catalog,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Org => "组织",
            Self::Vdc => "虚拟数据中心",
            Self::VApp => "vApp",
            Self::Vm => "虚拟机",
            Self::Network => "网络",
            Self::Catalog => "目录",
        };
        f.write_str(name)
    }
}

/// 可由句柄承载的远端对象表示
pub trait Resource:
    DeserializeOwned + Serialize + Clone + Default + Send + Sync + 'static
{
    const KIND: ObjectKind;

    fn href(&self) -> &str;

    fn name(&self) -> &str;

    /// 对象上尚未结束的任务
    fn tasks(&self) -> &[TaskSnapshot];

    fn kind(&self) -> ObjectKind {
        Self::KIND
    }
}

/// 对象的轻量引用，用于删除计划和日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub href: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, href: &str, name: &str) -> Self {
        Self {
            kind,
            href: href.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{} {}", self.kind, self.href)
        } else {
            write!(f, "{} '{}' ({})", self.kind, self.name, self.href)
        }
    }
}

/// 可刷新的对象
#[async_trait]
pub trait Refreshable: Send + Sync {
    fn identifier(&self) -> &str;

    fn kind(&self) -> ObjectKind;

    async fn refresh(&mut self) -> Result<(), RefreshError>;
}

/// 远端对象句柄
#[derive(Clone)]
pub struct ObjectHandle<S: Resource> {
    href: String,
    snapshot: Option<S>,
    transport: Arc<dyn Transport>,
}

pub type OrgHandle = ObjectHandle<Org>;
pub type VdcHandle = ObjectHandle<Vdc>;
pub type VAppHandle = ObjectHandle<VApp>;
pub type VmHandle = ObjectHandle<Vm>;
pub type NetworkHandle = ObjectHandle<OrgVdcNetwork>;
pub type CatalogHandle = ObjectHandle<Catalog>;

impl<S: Resource> fmt::Debug for ObjectHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("kind", &S::KIND)
            .field("href", &self.href)
            .field("initialized", &self.snapshot.is_some())
            .finish()
    }
}

impl<S: Resource> ObjectHandle<S> {
    /// 仅持有 href，尚未获取快照
    pub fn new(transport: Arc<dyn Transport>, href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            snapshot: None,
            transport,
        }
    }

    /// 由已获取的表示构造
    pub fn from_snapshot(transport: Arc<dyn Transport>, snapshot: S) -> Self {
        Self {
            href: snapshot.href().to_string(),
            snapshot: Some(snapshot),
            transport,
        }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn kind(&self) -> ObjectKind {
        S::KIND
    }

    /// 最近一次获取的快照
    pub fn snapshot(&self) -> Option<&S> {
        self.snapshot.as_ref()
    }

    pub fn name(&self) -> &str {
        self.snapshot.as_ref().map(Resource::name).unwrap_or_default()
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// 取快照，未初始化时报错
    pub fn require_initialized(&self) -> Result<&S, VcdError> {
        self.snapshot
            .as_ref()
            .ok_or(VcdError::NotInitialized(S::KIND))
    }

    pub fn as_ref(&self) -> ObjectRef {
        ObjectRef::new(S::KIND, &self.href, self.name())
    }

    /// 快照中记录的未结束任务
    pub fn pending_tasks(&self) -> Vec<Task> {
        self.snapshot
            .iter()
            .flat_map(|s| s.tasks())
            .map(|t| Task::from_snapshot(Arc::clone(&self.transport), t.clone()))
            .filter(|t| !t.status().is_terminal())
            .collect()
    }

    /// 重新获取远端表示并整体替换快照
    pub async fn refresh(&mut self) -> Result<(), RefreshError> {
        if self.href.is_empty() {
            return Err(RefreshError::NotInitialized(S::KIND));
        }

        debug!("刷新 {}: {}", S::KIND, self.href);
        let response = self
            .transport
            .send(Request::get(self.href.clone()))
            .await
            .map_err(|e| self.refresh_failed(VcdError::Transport(e)))?;

        if response.is_not_found() {
            return Err(RefreshError::ObjectAbsent {
                kind: S::KIND,
                href: self.href.clone(),
            });
        }
        if !response.is_success() {
            return Err(self.refresh_failed(VcdError::from_response(&self.href, &response)));
        }

        let snapshot: S = serde_json::from_str(&response.body)
            .map_err(|e| self.refresh_failed(VcdError::Parse(e.to_string())))?;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn refresh_failed(&self, cause: VcdError) -> RefreshError {
        RefreshError::RefreshFailed {
            kind: S::KIND,
            href: self.href.clone(),
            cause: Box::new(cause),
        }
    }
}

#[async_trait]
impl<S: Resource> Refreshable for ObjectHandle<S> {
    fn identifier(&self) -> &str {
        &self.href
    }

    fn kind(&self) -> ObjectKind {
        S::KIND
    }

    async fn refresh(&mut self) -> Result<(), RefreshError> {
        ObjectHandle::refresh(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reference;
    use vcd_transport::{Method, MockTransport, TransportError};

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::GET,
            "/api/vdc/1",
            200,
            serde_json::json!({
                "href": "/api/vdc/1",
                "name": "vdc-a",
                "vapps": [{"href": "/api/vApp/1"}]
            }),
        );
        mock.respond(
            Method::GET,
            "/api/vdc/1",
            200,
            serde_json::json!({"href": "/api/vdc/1", "name": "vdc-b", "vapps": []}),
        );

        let mut handle = VdcHandle::new(mock.clone(), "/api/vdc/1");
        assert!(!handle.is_initialized());
        assert_eq!(handle.name(), "");

        handle.refresh().await.unwrap();
        assert_eq!(handle.name(), "vdc-a");
        assert_eq!(
            handle.snapshot().unwrap().vapps,
            vec![Reference { href: "/api/vApp/1".into(), ..Default::default() }]
        );

        handle.refresh().await.unwrap();
        assert_eq!(handle.name(), "vdc-b");
        assert!(handle.snapshot().unwrap().vapps.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_keeps_snapshot() {
        let mock = Arc::new(MockTransport::new());
        let org = Org {
            href: "/api/org/1".into(),
            name: "acme".into(),
            ..Default::default()
        };
        mock.fail(Method::GET, "/api/org/1", TransportError::Timeout("slow".into()));

        let mut handle = OrgHandle::from_snapshot(mock.clone(), org);
        let err = handle.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::RefreshFailed { kind: ObjectKind::Org, .. }));
        assert_eq!(handle.name(), "acme");
    }

    #[test]
    fn test_require_initialized() {
        let handle = VmHandle::new(Arc::new(MockTransport::new()), "/api/vApp/vm-1");
        let err = handle.require_initialized().unwrap_err();
        assert!(matches!(err, VcdError::NotInitialized(ObjectKind::Vm)));
    }

    #[test]
    fn test_pending_tasks_skip_terminal() {
        let vapp = VApp {
            href: "/api/vApp/1".into(),
            tasks: vec![
                TaskSnapshot {
                    href: "/api/task/1".into(),
                    status: "running".into(),
                    ..Default::default()
                },
                TaskSnapshot {
                    href: "/api/task/2".into(),
                    status: "success".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let handle = VAppHandle::from_snapshot(Arc::new(MockTransport::new()), vapp);
        let pending = handle.pending_tasks();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].href(), "/api/task/1");
    }
}
