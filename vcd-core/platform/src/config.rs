//! 平台行为配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 平台配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// 任务轮询配置
    #[serde(default)]
    pub task: TaskConfig,

    /// 重试配置
    #[serde(default)]
    pub retry: RetryConfig,

    /// 级联删除配置
    #[serde(default)]
    pub deletion: DeletionConfig,
}

/// 任务轮询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// 初始轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// 最大轮询间隔（毫秒）
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval: u64,

    /// 轮询间隔增长倍数
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// 允许的连续轮询失败次数
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// 默认等待超时（秒）
    #[serde(default = "default_task_timeout")]
    pub timeout: u64,
}

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 初始重试延迟（毫秒）
    #[serde(default = "default_initial_delay")]
    pub initial_delay: u64,

    /// 最大重试延迟（毫秒）
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,

    /// 退避倍数
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// 默认重试时限（秒）
    #[serde(default = "default_retry_timeout")]
    pub timeout: u64,
}

/// 级联删除配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    /// 每个删除步骤的重试时限和任务等待时限（秒）
    #[serde(default = "default_step_timeout")]
    pub step_timeout: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_poll_interval: default_max_poll_interval(),
            backoff_multiplier: default_backoff_multiplier(),
            max_poll_failures: default_max_poll_failures(),
            timeout: default_task_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            timeout: default_retry_timeout(),
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            step_timeout: default_step_timeout(),
        }
    }
}

impl TaskConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// 第 `attempt` 次轮询后的等待间隔
    pub fn poll_delay(&self, attempt: u32) -> Duration {
        capped_backoff(
            self.poll_interval,
            self.max_poll_interval,
            self.backoff_multiplier,
            attempt,
        )
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// 计算第 `attempt` 次重试前的延迟
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        capped_backoff(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            attempt,
        )
    }
}

impl DeletionConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout)
    }
}

/// 指数退避，倍数小于 1 时按 1 处理，保证延迟单调不减
fn capped_backoff(initial_ms: u64, max_ms: u64, multiplier: f64, attempt: u32) -> Duration {
    let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let delay = initial_ms as f64 * multiplier.powi(exponent);
    let capped = delay.min(max_ms.max(initial_ms) as f64);
    Duration::from_millis(capped as u64)
}

// 默认值函数
fn default_poll_interval() -> u64 {
    500
}

fn default_max_poll_interval() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_poll_failures() -> u32 {
    5
}

fn default_task_timeout() -> u64 {
    600
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_retry_timeout() -> u64 {
    300
}

fn default_step_timeout() -> u64 {
    900
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PlatformConfig::default();
        assert_eq!(config.task.poll_interval, 500);
        assert_eq!(config.task.max_poll_interval, 5_000);
        assert_eq!(config.task.max_poll_failures, 5);
        assert_eq!(config.task.timeout(), Duration::from_secs(600));
        assert_eq!(config.retry.initial_delay, 1_000);
        assert_eq!(config.retry.max_delay, 30_000);
        assert_eq!(config.retry.timeout(), Duration::from_secs(300));
        assert_eq!(config.deletion.step_timeout(), Duration::from_secs(900));
    }

    #[test]
    fn test_retry_delay_calculation() {
        let config = RetryConfig {
            initial_delay: 1_000,
            max_delay: 60_000,
            backoff_multiplier: 2.0,
            ..Default::default()
        };

        // 第一次重试: 1 * 2^0 = 1秒
        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        // 第二次重试: 1 * 2^1 = 2秒
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        // 第三次重试: 1 * 2^2 = 4秒
        assert_eq!(config.calculate_delay(2), Duration::from_secs(4));
        // 超过上限后封顶
        assert_eq!(config.calculate_delay(10), Duration::from_secs(60));
        assert_eq!(config.calculate_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_never_decreases() {
        let config = RetryConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        let delays: Vec<Duration> = (0..8).map(|n| config.calculate_delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_poll_delay_capped() {
        let config = TaskConfig::default();
        assert_eq!(config.poll_delay(0), Duration::from_millis(500));
        assert_eq!(config.poll_delay(1), Duration::from_millis(1_000));
        assert_eq!(config.poll_delay(20), Duration::from_millis(5_000));
    }

    #[test]
    fn test_partial_config_deserialize() {
        let json = r#"{"task": {"poll_interval": 100}, "retry": {"timeout": 30}}"#;
        let config: PlatformConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.task.poll_interval, 100);
        assert_eq!(config.task.max_poll_interval, 5_000);
        assert_eq!(config.retry.timeout, 30);
        assert_eq!(config.deletion.step_timeout, 900);
    }
}
