use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::error::LaunchError;
use crate::models::{ProcessFingerprint, ProcessRecord};

/// 进程表数据源
///
/// 每次调用 `snapshot` 都必须重新读取，调用方不缓存结果
pub trait ProcessTable {
    fn snapshot(&self) -> Vec<ProcessRecord>;
}

/// 基于 sysinfo 的真实进程表
#[derive(Debug, Default)]
pub struct SysinfoProcessTable;

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&self) -> Vec<ProcessRecord> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let mut records: Vec<ProcessRecord> = sys
            .processes()
            .iter()
            // Linux 上每个线程也会作为一条记录出现，只保留进程本身
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| {
                let command_line = process
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                ProcessRecord::new(pid.as_u32(), process.name().to_string_lossy(), command_line)
            })
            .collect();

        // HashMap 遍历顺序不稳定，按 PID 排序
        records.sort_by_key(|r| r.pid);
        records
    }
}

/// 所有按命令行匹配指纹的实例 PID（排除当前进程）
pub fn matching_instances<T: ProcessTable + ?Sized>(
    table: &T,
    fingerprint: &ProcessFingerprint,
) -> Vec<u32> {
    let own_pid = std::process::id();
    table
        .snapshot()
        .iter()
        .filter(|record| record.pid != own_pid)
        .filter(|record| fingerprint.matches_cmdline(record))
        .map(|record| record.pid)
        .collect()
}

/// 单实例检查
///
/// - 没有匹配：`Ok(None)`
/// - 恰好一个：`Ok(Some(pid))`
/// - 多个匹配：返回 `AmbiguousInstance`，不猜测该选哪一个
pub fn is_already_running<T: ProcessTable + ?Sized>(
    table: &T,
    fingerprint: &ProcessFingerprint,
) -> Result<Option<u32>, LaunchError> {
    let pids = matching_instances(table, fingerprint);
    log::debug!("Instance check for {}: matching PIDs {:?}", fingerprint, pids);

    match pids.as_slice() {
        [] => Ok(None),
        [pid] => Ok(Some(*pid)),
        _ => Err(LaunchError::AmbiguousInstance {
            fingerprint: fingerprint.to_string(),
            pids,
        }),
    }
}

/// 是否存在按进程名匹配的进程（就绪等待使用）
pub fn check_process_running<T: ProcessTable + ?Sized>(
    table: &T,
    fingerprint: &ProcessFingerprint,
) -> bool {
    table
        .snapshot()
        .iter()
        .any(|record| fingerprint.matches_name(record))
}
