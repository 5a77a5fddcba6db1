//! 平台错误定义

use std::time::Duration;

use thiserror::Error;
use vcd_transport::{Response, TransportError};

use crate::cascade::StepAction;
use crate::handle::ObjectKind;
use crate::models::ErrorDetail;
use crate::retry::{Attempt, RetryError};

/// 远端表示"对象正忙"的次要错误码
const BUSY_ENTITY: &str = "BUSY_ENTITY";

/// 任务错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("任务句柄未初始化")]
    NotInitialized,

    #[error("任务 {task} 执行失败: {detail}")]
    Failed { task: String, detail: ErrorDetail },

    #[error("等待任务 {task} 超时 (已等待 {waited:?})")]
    Timeout { task: String, waited: Duration },

    #[error("轮询任务 {task} 失败 (连续 {failures} 次): {cause}")]
    Transport {
        task: String,
        failures: u32,
        cause: String,
        /// 远端拒绝查询 (非 404/429 的 4xx)，重试无意义
        permanent: bool,
    },
}

/// 对象刷新错误
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("{0} 句柄未初始化")]
    NotInitialized(ObjectKind),

    #[error("{kind} 不存在: {href}")]
    ObjectAbsent { kind: ObjectKind, href: String },

    #[error("刷新 {kind} {href} 失败: {cause}")]
    RefreshFailed {
        kind: ObjectKind,
        href: String,
        cause: Box<VcdError>,
    },
}

/// vApp 组合错误
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("虚拟机 {vm} 引用的网络 {network} 未加入 vApp")]
    NetworkNotAttached { network: String, vm: String },

    #[error("组合请求无效: {0}")]
    Malformed(String),

    #[error("等待 vApp 未完成任务失败: {0}")]
    PendingTask(#[source] TaskError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("提交组合请求失败: {0}")]
    Submit(#[source] Box<VcdError>),

    #[error("组合响应中缺少任务: {0}")]
    MissingTask(String),
}

/// 级联删除错误
#[derive(Error, Debug)]
pub enum DeletionError {
    #[error("{root} 仍有 {children} 个子对象，未指定 recursive")]
    HasChildren { root: String, children: usize },

    #[error("删除计划第 {step} 步 ({action} {object}) 失败: {cause}")]
    StepFailed {
        step: usize,
        action: StepAction,
        object: String,
        cause: Box<VcdError>,
    },

    #[error("生成删除计划失败: {0}")]
    Planning(#[source] Box<VcdError>),
}

/// 平台错误类型
#[derive(Error, Debug)]
pub enum VcdError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("API 错误 [{status}]: {message}")]
    Api {
        status: u16,
        message: String,
        minor_code: Option<String>,
    },

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("解析错误: {0}")]
    Parse(String),

    #[error("{0} 句柄未初始化")]
    NotInitialized(ObjectKind),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Deletion(#[from] DeletionError),

    #[error("重试 {attempts} 次后仍失败 (耗时 {elapsed:?}): {last}")]
    RetryExhausted {
        attempts: u32,
        elapsed: Duration,
        last: Box<VcdError>,
    },
}

impl VcdError {
    /// 由非 2xx 响应构造错误
    pub fn from_response(path: &str, response: &Response) -> Self {
        if response.is_not_found() {
            return Self::NotFound(path.to_string());
        }
        let detail: ErrorDetail = serde_json::from_str(&response.body).unwrap_or_default();
        let message = if detail.message.is_empty() {
            response.body.trim().to_string()
        } else {
            detail.message
        };
        Self::Api {
            status: response.status,
            message,
            minor_code: detail.minor_error_code,
        }
    }

    /// 是否值得重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_permanent(),
            Self::Api {
                status,
                message,
                minor_code,
            } => {
                *status == 429
                    || *status >= 500
                    || minor_code.as_deref() == Some(BUSY_ENTITY)
                    || message.contains("is busy")
            }
            Self::Task(TaskError::Transport { permanent, .. }) => !permanent,
            Self::Refresh(RefreshError::RefreshFailed { cause, .. }) => cause.is_retryable(),
            _ => false,
        }
    }

    /// 对象是否已不存在
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Refresh(RefreshError::ObjectAbsent { .. })
                | Self::Api { status: 404, .. }
        )
    }

    /// 按重试分类包装
    pub fn classify(self) -> Attempt<VcdError> {
        if self.is_retryable() {
            Attempt::Transient(self)
        } else {
            Attempt::Fatal(self)
        }
    }
}

impl From<RetryError<VcdError>> for VcdError {
    fn from(e: RetryError<VcdError>) -> Self {
        match e {
            RetryError::Fatal(inner) => inner,
            RetryError::Exhausted {
                attempts,
                elapsed,
                last,
            } => Self::RetryExhausted {
                attempts,
                elapsed,
                last: Box::new(last),
            },
        }
    }
}

/// 平台结果类型
pub type Result<T> = std::result::Result<T, VcdError>;
