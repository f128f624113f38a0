use std::thread::sleep;
use std::time::Duration;

use crate::models::ProcessFingerprint;
use crate::services::process_checker::{check_process_running, ProcessTable};

/// 就绪等待策略：最多尝试 `attempts` 次，每次失败后等待 `interval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl WaitPolicy {
    /// 每秒检查一次，共 `timeout_seconds` 次
    pub fn seconds(timeout_seconds: u32) -> Self {
        Self {
            attempts: timeout_seconds,
            interval: Duration::from_secs(1),
        }
    }
}

/// 等待某个进程出现
///
/// 超时不是错误，只返回 `false`，调用方照常继续
pub fn wait_for<T: ProcessTable + ?Sized>(
    table: &T,
    fingerprint: &ProcessFingerprint,
    policy: WaitPolicy,
) -> bool {
    for attempt in 1..=policy.attempts {
        if check_process_running(table, fingerprint) {
            log::info!("✅ {} is up (attempt {}/{})", fingerprint, attempt, policy.attempts);
            return true;
        }
        log::debug!("Waiting for {} ({}/{})", fingerprint, attempt, policy.attempts);
        sleep(policy.interval);
    }

    log::warn!(
        "⏱  {} did not appear after {} attempts, continuing anyway",
        fingerprint,
        policy.attempts
    );
    false
}
