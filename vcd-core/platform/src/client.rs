//! VCD 平台客户端核心实现

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};
use vcd_transport::{Method, Request, Response, Transport};

use crate::api::{CatalogApi, NetworkApi, OrgApi, VAppApi, VdcApi, VmApi};
use crate::cascade::Orchestrator;
use crate::clock::{Clock, TokioClock};
use crate::compose::Composer;
use crate::config::PlatformConfig;
use crate::error::{Result, TaskError, VcdError};
use crate::handle::{ObjectHandle, Resource};
use crate::models::{QueryReferences, Reference, TaskSnapshot};
use crate::retry::{Attempt, RetryPolicy};
use crate::task::{Task, TaskTracker};

/// 修改请求的结果
#[derive(Debug, Clone)]
pub enum Submission {
    /// 远端返回了异步任务
    Task(Task),
    /// 远端同步完成，没有任务
    Completed,
    /// 目标对象已不存在
    Absent,
}

impl Submission {
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// VCD 平台客户端
#[derive(Clone)]
pub struct VcdClient {
    /// 共享传输层
    transport: Arc<dyn Transport>,

    /// 配置
    config: PlatformConfig,

    /// 时钟
    clock: Arc<dyn Clock>,
}

impl VcdClient {
    /// 创建使用真实时钟的客户端
    pub fn new(transport: Arc<dyn Transport>, config: PlatformConfig) -> Self {
        Self::with_clock(transport, config, Arc::new(TokioClock))
    }

    pub fn with_clock(
        transport: Arc<dyn Transport>,
        config: PlatformConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            config,
            clock,
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// 获取组织管理 API
    pub fn org(&self) -> OrgApi<'_> {
        OrgApi::new(self)
    }

    /// 获取虚拟数据中心管理 API
    pub fn vdc(&self) -> VdcApi<'_> {
        VdcApi::new(self)
    }

    /// 获取 vApp 管理 API
    pub fn vapp(&self) -> VAppApi<'_> {
        VAppApi::new(self)
    }

    /// 获取虚拟机管理 API
    pub fn vm(&self) -> VmApi<'_> {
        VmApi::new(self)
    }

    /// 获取网络管理 API
    pub fn network(&self) -> NetworkApi<'_> {
        NetworkApi::new(self)
    }

    /// 获取目录管理 API
    pub fn catalog(&self) -> CatalogApi<'_> {
        CatalogApi::new(self)
    }

    /// 获取 vApp 组合器
    pub fn composer(&self) -> Composer<'_> {
        Composer::new(self)
    }

    /// 获取级联删除编排器
    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(self)
    }

    pub fn tracker(&self) -> TaskTracker {
        TaskTracker::new(self.config.task.clone(), Arc::clone(&self.clock))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.retry.clone(), Arc::clone(&self.clock))
    }

    /// 由 href 构造任务句柄
    pub fn task(&self, href: &str) -> Task {
        Task::new(self.transport(), href)
    }

    /// 提交修改请求并等待其任务结束
    ///
    /// 提交在重试时限内按错误分类重试。任务轮询连续失败时重新等待同一任务，
    /// 任务失败或超时不会重新提交。
    pub async fn submit_and_wait<F, Fut>(&self, label: &str, op: F) -> Result<Submission>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Submission>>,
    {
        self.submit_and_wait_within(
            label,
            self.config.retry.timeout(),
            self.config.task.timeout(),
            op,
        )
        .await
    }

    /// `budget` 限制提交和轮询失败的重试，`wait` 是等待任务结束的总时限
    pub(crate) async fn submit_and_wait_within<F, Fut>(
        &self,
        label: &str,
        budget: Duration,
        wait: Duration,
        mut op: F,
    ) -> Result<Submission>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Submission>>,
    {
        info!("{}", label);
        let policy = self.retry_policy();
        let submission = policy
            .retry(budget, || {
                let fut = op();
                async move { fut.await.map_err(VcdError::classify) }
            })
            .await?;

        match submission {
            Submission::Task(task) => {
                let task = self.wait_within(task, budget, wait).await?;
                Ok(Submission::Task(task))
            }
            other => Ok(other),
        }
    }

    /// 等待任务结束，轮询传输失败在 `budget` 内重新等待同一任务
    async fn wait_within(&self, task: Task, budget: Duration, wait: Duration) -> Result<Task> {
        let tracker = self.tracker();
        let clock = Arc::clone(&self.clock);
        let start = clock.now();
        let (tracker, clock, task) = (&tracker, &clock, &task);

        let finished = self
            .retry_policy()
            .retry(budget, move || async move {
                let remaining = wait.saturating_sub(clock.now().saturating_duration_since(start));
                let mut current = task.clone();
                match tracker.await_completion(&mut current, remaining).await {
                    Ok(()) => Ok(current),
                    Err(e @ TaskError::Transport { permanent: false, .. }) => {
                        Err(Attempt::Transient(VcdError::Task(e)))
                    }
                    Err(e) => Err(Attempt::Fatal(VcdError::Task(e))),
                }
            })
            .await?;
        Ok(finished)
    }

    /// 发送请求，非 2xx 转为错误
    pub(crate) async fn execute(&self, request: Request) -> Result<Response> {
        debug!("VCD API 请求: {} {}", request.method, request.path);
        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(VcdError::from_response(&path, &response));
        }
        Ok(response)
    }

    /// 获取对象并构造已初始化的句柄
    pub(crate) async fn fetch<S: Resource>(&self, href: &str) -> Result<ObjectHandle<S>> {
        let mut handle = ObjectHandle::new(self.transport(), href);
        handle.refresh().await?;
        Ok(handle)
    }

    /// 发送修改请求，404 视为目标已不存在
    pub(crate) async fn submit(&self, request: Request) -> Result<Submission> {
        debug!("VCD API 请求: {} {}", request.method, request.path);
        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        if response.is_not_found() {
            return Ok(Submission::Absent);
        }
        if !response.is_success() {
            return Err(VcdError::from_response(&path, &response));
        }
        Ok(match self.extract_task(&response.body)? {
            Some(task) => Submission::Task(task),
            None => Submission::Completed,
        })
    }

    /// POST `{href}/action/{action}`
    pub(crate) async fn post_action(
        &self,
        href: &str,
        action: &str,
        body: Option<(&str, String)>,
    ) -> Result<Submission> {
        let mut request = Request::new(Method::POST, format!("{}/action/{}", href, action));
        if let Some((media_type, body)) = body {
            request = request
                .with_header("Content-Type", media_type)
                .with_body(body);
        }
        self.submit(request).await
    }

    /// 创建对象，返回新对象句柄和创建任务
    pub(crate) async fn create_object<P: Serialize, S: Resource>(
        &self,
        path: &str,
        media_type: &str,
        params: &P,
    ) -> Result<(ObjectHandle<S>, Option<Task>)> {
        let body = serde_json::to_string(params).map_err(|e| VcdError::Parse(e.to_string()))?;
        let request = Request::new(Method::POST, path)
            .with_header("Content-Type", media_type)
            .with_body(body);
        let response = self.execute(request).await?;

        let snapshot: S =
            serde_json::from_str(&response.body).map_err(|e| VcdError::Parse(e.to_string()))?;
        let handle = ObjectHandle::from_snapshot(self.transport(), snapshot);
        let task = handle.pending_tasks().into_iter().next();
        Ok((handle, task))
    }

    /// PUT 对象表示
    pub(crate) async fn update_object<S: Serialize>(
        &self,
        href: &str,
        media_type: &str,
        desired: &S,
    ) -> Result<Submission> {
        let body = serde_json::to_string(desired).map_err(|e| VcdError::Parse(e.to_string()))?;
        let request = Request::new(Method::PUT, href)
            .with_header("Content-Type", media_type)
            .with_body(body);
        self.submit(request).await
    }

    /// DELETE `{href}?force=..&recursive=..`
    pub(crate) async fn delete_object(
        &self,
        href: &str,
        force: bool,
        recursive: bool,
    ) -> Result<Submission> {
        let path = format!("{}?force={}&recursive={}", href, force, recursive);
        self.submit(Request::new(Method::DELETE, path)).await
    }

    /// 按名称查询对象引用
    pub(crate) async fn query_reference(
        &self,
        query_type: &str,
        name: &str,
    ) -> Result<Option<Reference>> {
        let path = format!(
            "/api/query?type={}&format=references&filter=name=={}",
            query_type,
            urlencoding::encode(name)
        );
        let response = self.execute(Request::get(path)).await?;
        let refs: QueryReferences =
            serde_json::from_str(&response.body).map_err(|e| VcdError::Parse(e.to_string()))?;
        Ok(refs.reference.into_iter().find(|r| r.name == name))
    }

    /// 从修改响应中提取任务
    ///
    /// 响应可能为空、是任务表示本身，或是带 `tasks` 列表的对象表示。
    pub(crate) fn extract_task(&self, body: &str) -> Result<Option<Task>> {
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| VcdError::Parse(e.to_string()))?;

        let snapshot = if let Some(tasks) = value.get("tasks").and_then(|t| t.as_array()) {
            match tasks.first() {
                Some(first) => first.clone(),
                None => return Ok(None),
            }
        } else if is_task_representation(&value) {
            value
        } else {
            return Ok(None);
        };

        let snapshot: TaskSnapshot =
            serde_json::from_value(snapshot).map_err(|e| VcdError::Parse(e.to_string()))?;
        Ok(Some(Task::from_snapshot(self.transport(), snapshot)))
    }
}

fn is_task_representation(value: &serde_json::Value) -> bool {
    value
        .get("href")
        .and_then(|h| h.as_str())
        .map(|h| h.contains("/task/"))
        .unwrap_or(false)
}
