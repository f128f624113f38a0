use thiserror::Error;

/// 调用方需要区分处理的启动错误，其余错误统一走 anyhow
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("more than one running instance matches {fingerprint}: pids {pids:?}")]
    AmbiguousInstance { fingerprint: String, pids: Vec<u32> },

    #[error("target user '{user}' does not exist")]
    UserNotFound { user: String },

    #[error("still running as root after re-exec as '{user}', refusing to loop")]
    ReexecLoop { user: String },

    #[error("invalid process fingerprint: {0}")]
    InvalidFingerprint(String),
}
