//! 异步任务跟踪
//!
//! 远端修改操作返回任务句柄，`TaskTracker` 轮询任务直到终态或超时。
//! 轮询间隔按 `TaskConfig` 指数增长并封顶，单次轮询失败不会中断等待。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use vcd_transport::{Request, Transport};

use crate::clock::Clock;
use crate::config::TaskConfig;
use crate::error::{TaskError, VcdError};
use crate::models::{ErrorDetail, TaskSnapshot};

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    /// 映射远端状态字符串，未知状态按运行中处理
    pub fn from_remote(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "preRunning" | "running" => Self::Running,
            "success" => Self::Success,
            "error" | "canceled" | "aborted" => Self::Error,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Success | Self::Error => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// 单次轮询失败
#[derive(Debug)]
pub(crate) enum PollFailure {
    /// 可继续轮询
    Transient(String),
    /// 继续轮询无意义
    Permanent(String),
}

/// 远端异步任务
#[derive(Clone)]
pub struct Task {
    href: String,
    operation: String,
    status: TaskStatus,
    error: Option<ErrorDetail>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("href", &self.href)
            .field("operation", &self.operation)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish()
    }
}

impl Task {
    pub fn new(transport: Arc<dyn Transport>, href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            operation: String::new(),
            status: TaskStatus::Queued,
            error: None,
            transport,
        }
    }

    pub fn from_snapshot(transport: Arc<dyn Transport>, snapshot: TaskSnapshot) -> Self {
        let mut task = Self::new(transport, snapshot.href.clone());
        task.operation = snapshot.operation.clone();
        task.observe(&snapshot);
        task
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    /// 当前已知状态的表示
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            href: self.href.clone(),
            status: self.status.to_string(),
            operation: self.operation.clone(),
            error: self.error.clone(),
        }
    }

    /// 合并一次观测结果，终态之后不再变化
    fn observe(&mut self, snapshot: &TaskSnapshot) {
        if self.status.is_terminal() {
            return;
        }
        let status = TaskStatus::from_remote(&snapshot.status);
        if status.rank() < self.status.rank() {
            return;
        }
        self.status = status;
        if !snapshot.operation.is_empty() {
            self.operation = snapshot.operation.clone();
        }
        if status == TaskStatus::Error {
            self.error = Some(snapshot.error.clone().unwrap_or_else(|| ErrorDetail {
                message: format!("任务结束状态: {}", snapshot.status),
                ..Default::default()
            }));
        }
    }

    /// 获取一次任务状态
    pub(crate) async fn poll(&mut self) -> Result<TaskStatus, PollFailure> {
        let response = self
            .transport
            .send(Request::get(self.href.clone()))
            .await
            .map_err(|e| {
                if e.is_permanent() {
                    PollFailure::Permanent(e.to_string())
                } else {
                    PollFailure::Transient(e.to_string())
                }
            })?;

        if !response.is_success() {
            let err = VcdError::from_response(&self.href, &response);
            return Err(match response.status {
                404 | 429 | 500..=599 => PollFailure::Transient(err.to_string()),
                _ => PollFailure::Permanent(err.to_string()),
            });
        }

        let snapshot: TaskSnapshot = serde_json::from_str(&response.body)
            .map_err(|e| PollFailure::Transient(format!("任务表示解析失败: {e}")))?;
        debug!("任务 {} 状态: {}", self.href, snapshot.status);
        self.observe(&snapshot);
        Ok(self.status)
    }

    fn outcome(&self) -> Result<(), TaskError> {
        match self.status {
            TaskStatus::Error => Err(TaskError::Failed {
                task: self.href.clone(),
                detail: self.error.clone().unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }
}

/// 任务跟踪器
#[derive(Clone)]
pub struct TaskTracker {
    config: TaskConfig,
    clock: Arc<dyn Clock>,
}

impl TaskTracker {
    pub fn new(config: TaskConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// 轮询任务直到成功、失败或超过 `timeout`
    pub async fn await_completion(
        &self,
        task: &mut Task,
        timeout: Duration,
    ) -> Result<(), TaskError> {
        if task.href.is_empty() {
            return Err(TaskError::NotInitialized);
        }
        if task.status.is_terminal() {
            return task.outcome();
        }

        let start = self.clock.now();
        let mut polls: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            match task.poll().await {
                Ok(_) => failures = 0,
                Err(PollFailure::Transient(cause)) => {
                    failures += 1;
                    warn!(
                        "轮询任务 {} 失败 ({}/{}): {}",
                        task.href, failures, self.config.max_poll_failures, cause
                    );
                    if failures >= self.config.max_poll_failures {
                        return Err(TaskError::Transport {
                            task: task.href.clone(),
                            failures,
                            cause,
                            permanent: false,
                        });
                    }
                }
                Err(PollFailure::Permanent(cause)) => {
                    return Err(TaskError::Transport {
                        task: task.href.clone(),
                        failures: failures + 1,
                        cause,
                        permanent: true,
                    });
                }
            }

            if task.status.is_terminal() {
                info!("任务 {} 结束: {}", task.href, task.status);
                return task.outcome();
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= timeout {
                return Err(TaskError::Timeout {
                    task: task.href.clone(),
                    waited: elapsed,
                });
            }

            let delay = self.config.poll_delay(polls).min(timeout - elapsed);
            polls = polls.saturating_add(1);
            self.clock.sleep(delay).await;
        }
    }

    /// 依次等待多个任务，共享同一个截止时间
    pub async fn await_all(&self, tasks: &mut [Task], timeout: Duration) -> Result<(), TaskError> {
        let start = self.clock.now();
        for task in tasks.iter_mut() {
            let elapsed = self.clock.now().saturating_duration_since(start);
            let remaining = timeout.saturating_sub(elapsed);
            self.await_completion(task, remaining).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcd_transport::MockTransport;

    fn snapshot(status: &str) -> TaskSnapshot {
        TaskSnapshot {
            href: "/api/task/1".into(),
            status: status.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(TaskStatus::from_remote("queued"), TaskStatus::Queued);
        assert_eq!(TaskStatus::from_remote("preRunning"), TaskStatus::Running);
        assert_eq!(TaskStatus::from_remote("running"), TaskStatus::Running);
        assert_eq!(TaskStatus::from_remote("success"), TaskStatus::Success);
        assert_eq!(TaskStatus::from_remote("aborted"), TaskStatus::Error);
        assert_eq!(TaskStatus::from_remote("canceled"), TaskStatus::Error);
        assert_eq!(TaskStatus::from_remote("somethingNew"), TaskStatus::Running);
    }

    #[test]
    fn test_terminal_status_never_reverts() {
        let mut task = Task::from_snapshot(Arc::new(MockTransport::new()), snapshot("success"));
        task.observe(&snapshot("running"));
        assert_eq!(task.status(), TaskStatus::Success);

        let mut task = Task::from_snapshot(Arc::new(MockTransport::new()), snapshot("running"));
        task.observe(&snapshot("queued"));
        assert_eq!(task.status(), TaskStatus::Running);
    }

    #[test]
    fn test_error_without_detail_gets_message() {
        let task = Task::from_snapshot(Arc::new(MockTransport::new()), snapshot("canceled"));
        assert_eq!(task.status(), TaskStatus::Error);
        assert!(task.error().unwrap().message.contains("canceled"));
    }
}
