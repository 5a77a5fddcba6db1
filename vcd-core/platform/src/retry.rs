//! 有界重试
//!
//! 操作每次返回 `Attempt` 分类后的错误：`Transient` 在时限内按退避延迟重试，
//! `Fatal` 立即返回。第一次尝试总会执行，即使时限为零。
//! 下一次延迟会超出时限时直接放弃，不缩短延迟。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::clock::Clock;
use crate::config::RetryConfig;

/// 单次尝试的错误分类
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<E> {
    /// 可重试
    Transient(E),
    /// 不可重试
    Fatal(E),
}

impl<E> Attempt<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(e) | Self::Fatal(e) => e,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// 重试最终失败
#[derive(Error, Debug)]
pub enum RetryError<E: std::fmt::Display> {
    #[error("{0}")]
    Fatal(E),

    #[error("重试 {attempts} 次后放弃 (耗时 {elapsed:?}): {last}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: E,
    },
}

/// 重试策略
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 在 `max_timeout` 内重试 `operation`
    pub async fn retry<T, E, F, Fut>(
        &self,
        max_timeout: Duration,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        let start = self.clock.now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(e)) => return Err(RetryError::Fatal(e)),
                Err(Attempt::Transient(e)) => e,
            };

            let elapsed = self.clock.now().saturating_duration_since(start);
            let delay = self.config.calculate_delay(attempts - 1);
            if elapsed + delay > max_timeout {
                return Err(RetryError::Exhausted {
                    attempts,
                    elapsed,
                    last: err,
                });
            }

            warn!("第 {} 次尝试失败, {:?} 后重试: {}", attempts, delay, err);
            self.clock.sleep(delay).await;
        }
    }
}
