use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::models::LaunchConfig;
use crate::services::environment::{
    activate_virtualenv, current_environment, load_sources, Environment,
};
use crate::services::privilege::REEXEC_MARKER_ENV;

/// 一次启动所需的全部信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    pub env: Environment,
    pub log_path: PathBuf,
    pub info_file: Option<PathBuf>,
}

impl LaunchPlan {
    pub fn from_config(config: &LaunchConfig, env: Environment) -> Self {
        Self {
            program: config.entry_point_path(),
            args: config.service_args(),
            working_directory: config.working_directory.clone(),
            env,
            log_path: config.log_path.clone(),
            info_file: config.info_file.clone(),
        }
    }

    /// 便于日志输出的命令行
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 启动服务进程
pub trait Spawner {
    /// 启动后立即返回子进程 PID，不等待
    fn spawn(&mut self, plan: &LaunchPlan, log: &File) -> anyhow::Result<u32>;
}

/// 真实的后台启动：独立进程组，stdin 为 /dev/null，输出追加到日志
#[derive(Debug, Default)]
pub struct DetachedSpawner;

impl Spawner for DetachedSpawner {
    fn spawn(&mut self, plan: &LaunchPlan, log: &File) -> anyhow::Result<u32> {
        let stdout = log.try_clone().context("failed to duplicate log handle")?;
        let stderr = log.try_clone().context("failed to duplicate log handle")?;

        let child = Command::new(&plan.program)
            .args(&plan.args)
            .current_dir(&plan.working_directory)
            .env_clear()
            .envs(&plan.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()
            .with_context(|| format!("failed to spawn {}", plan.command_line()))?;

        // 不 wait：子进程交给 init 接管
        Ok(child.id())
    }
}

/// 以追加模式打开日志，必要时创建上级目录
pub fn open_log(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

pub fn banner(timestamp: &str) -> String {
    format!("=== doorman starting at {} ===\n", timestamp)
}

/// 把系统信息文件原样写入日志，读不到只告警
fn append_info_file(log: &mut File, info_file: &Path) -> anyhow::Result<()> {
    match std::fs::read(info_file) {
        Ok(bytes) => {
            log.write_all(&bytes)?;
            if !bytes.ends_with(b"\n") {
                log.write_all(b"\n")?;
            }
        }
        Err(e) => log::warn!("Cannot read info file {}: {}", info_file.display(), e),
    }
    Ok(())
}

/// 在 `base` 之上叠加 profile 和虚拟环境
///
/// 重新执行标记只属于启动器自己，不传给服务
fn service_environment(base: Environment, config: &LaunchConfig) -> anyhow::Result<Environment> {
    let mut env = base;
    load_sources(&config.environment_sources, &mut env)?;
    activate_virtualenv(&config.virtualenv_path(), &mut env);
    env.remove(REEXEC_MARKER_ENV);
    Ok(env)
}

/// 准备环境，构造启动计划
pub fn prepare(config: &LaunchConfig) -> anyhow::Result<LaunchPlan> {
    let env = service_environment(current_environment(), config)?;
    Ok(LaunchPlan::from_config(config, env))
}

/// 写日志头并后台启动服务，返回子进程 PID
pub fn launch<S: Spawner + ?Sized>(plan: &LaunchPlan, spawner: &mut S) -> anyhow::Result<u32> {
    let mut log = open_log(&plan.log_path)?;

    if let Some(info_file) = &plan.info_file {
        append_info_file(&mut log, info_file)
            .with_context(|| format!("failed to write {}", plan.log_path.display()))?;
    }

    let timestamp = chrono::Local::now().format("%a %b %e %H:%M:%S %Z %Y").to_string();
    log.write_all(banner(&timestamp).as_bytes())
        .with_context(|| format!("failed to write {}", plan.log_path.display()))?;
    log.flush()?;

    log::info!("🚀 Launching {}", plan.command_line());
    log::info!("   cwd: {}", plan.working_directory.display());
    log::info!("   log: {}", plan.log_path.display());

    let pid = spawner.spawn(plan, &log)?;
    log::info!("✅ doorman started with PID {}", pid);
    Ok(pid)
}
