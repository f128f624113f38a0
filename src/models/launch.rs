use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 语音唤醒方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Clap,
    #[default]
    Gpio,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Clap => "clap",
            TriggerMode::Gpio => "gpio",
        }
    }
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 启动配置，在入口处构造一次，之后只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// 服务输出（stdout + stderr）追加写入的日志
    pub log_path: PathBuf,
    /// 服务目录
    pub working_directory: PathBuf,
    /// 按顺序加载的 shell profile，后加载的覆盖先加载的
    pub environment_sources: Vec<PathBuf>,
    pub trigger_mode: TriggerMode,
    /// 固定传给服务的参数，位于 --trigger 之前
    pub extra_flags: Vec<String>,
    /// 虚拟环境目录，相对路径基于 working_directory
    pub virtualenv: PathBuf,
    /// 服务入口，相对路径基于 working_directory
    pub entry_point: PathBuf,
    /// 启动时原样写入日志的系统信息文件
    pub info_file: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/home/pi/doorman.log"),
            working_directory: PathBuf::from("/home/pi/AIY-voice-kit-python"),
            environment_sources: vec![
                PathBuf::from("/etc/profile"),
                PathBuf::from("/home/pi/.profile"),
            ],
            trigger_mode: TriggerMode::Gpio,
            extra_flags: vec!["--cloud-speech".to_string()],
            virtualenv: PathBuf::from("env"),
            entry_point: PathBuf::from("src/main.py"),
            info_file: Some(PathBuf::from("/etc/os-release")),
        }
    }
}

impl LaunchConfig {
    /// 传给服务的完整参数列表
    pub fn service_args(&self) -> Vec<String> {
        let mut args = self.extra_flags.clone();
        args.push(format!("--trigger={}", self.trigger_mode));
        args
    }

    pub fn entry_point_path(&self) -> PathBuf {
        self.working_directory.join(&self.entry_point)
    }

    pub fn virtualenv_path(&self) -> PathBuf {
        self.working_directory.join(&self.virtualenv)
    }
}
