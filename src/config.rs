use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::CommandArgs;
use crate::models::{LaunchConfig, ProcessFingerprint};

/// 启动器的全部设置
///
/// 优先级：内置默认值 < 配置文件 < 命令行 / 环境变量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub launch: LaunchConfig,
    /// root 启动时切换到的账户
    pub target_user: String,
    /// 桌面会话进程，root 启动时先等它出现
    pub session: ProcessFingerprint,
    /// 等待会话的秒数
    pub session_timeout: u32,
    /// doorman 服务本身的指纹，用于单实例检查
    pub service: ProcessFingerprint,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            launch: LaunchConfig::default(),
            target_user: "pi".to_string(),
            session: ProcessFingerprint::new("lxsession", "LXDE-pi"),
            session_timeout: 30,
            service: ProcessFingerprint::new("python", "src/main.py"),
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// 在入口处构造一次，之后只读
    pub fn resolve(args: &CommandArgs) -> anyhow::Result<Self> {
        let mut settings = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_args(args);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_args(&mut self, args: &CommandArgs) {
        if let Some(user) = &args.user {
            self.target_user = user.clone();
        }
        if let Some(mode) = args.trigger {
            self.launch.trigger_mode = mode;
        }
        if let Some(log) = &args.log {
            self.launch.log_path = log.clone();
        }
        if let Some(dir) = &args.service_dir {
            self.launch.working_directory = dir.clone();
        }
        if let Some(timeout) = args.session_timeout {
            self.session_timeout = timeout;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate().context("invalid session fingerprint")?;
        self.service.validate().context("invalid service fingerprint")?;
        if self.target_user.trim().is_empty() {
            anyhow::bail!("target user must not be empty");
        }
        if self.launch.log_path.as_os_str().is_empty() {
            anyhow::bail!("log path must not be empty");
        }
        Ok(())
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.launch.log_path
    }
}
