use clap::Parser;
use std::path::PathBuf;

use crate::models::TriggerMode;

/// Doorman Launcher - 开机启动 doorman 语音服务
///
/// 不带参数时使用内置默认值
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// JSON 配置文件
    #[arg(short, long, env = "DOORMAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// root 启动时切换到的用户
    #[arg(short, long, env = "DOORMAN_USER")]
    pub user: Option<String>,

    /// 唤醒方式
    #[arg(short, long, env = "DOORMAN_TRIGGER", value_enum)]
    pub trigger: Option<TriggerMode>,

    /// 服务日志文件
    #[arg(short, long, env = "DOORMAN_LOG")]
    pub log: Option<PathBuf>,

    /// 服务目录
    #[arg(short = 'd', long, env = "DOORMAN_SERVICE_DIR")]
    pub service_dir: Option<PathBuf>,

    /// 等待桌面会话的秒数
    #[arg(long, env = "DOORMAN_SESSION_TIMEOUT")]
    pub session_timeout: Option<u32>,

    /// 只做检查并打印启动计划，不真正启动
    #[arg(long)]
    pub dry_run: bool,
}
