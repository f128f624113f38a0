use anyhow::Context;
use nix::unistd::{geteuid, initgroups, setgid, setuid, Gid, Uid, User};
use std::ffi::{CString, OsString};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use crate::error::LaunchError;

/// 重新执行时带上的标记，第二轮启动据此判断自己是被 root 重启的
pub const REEXEC_MARKER_ENV: &str = "DOORMAN_REEXEC_FROM";

/// 当前进程的权限状态
///
/// ```text
/// Unprivileged                         -> 继续启动
/// Superuser -> ReexecPending -> exec   -> 进程被替换，不再返回
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeState {
    Superuser,
    Unprivileged { user: String },
}

impl PrivilegeState {
    pub fn detect() -> Self {
        Self::from_uid(geteuid())
    }

    pub fn from_uid(uid: Uid) -> Self {
        if uid.is_root() {
            return PrivilegeState::Superuser;
        }
        let user = match User::from_uid(uid) {
            Ok(Some(u)) => u.name,
            _ => uid.to_string(),
        };
        PrivilegeState::Unprivileged { user }
    }
}

/// 切换的目标账户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAccount {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,
}

impl TargetAccount {
    pub fn lookup(name: &str) -> anyhow::Result<Self> {
        let user = User::from_name(name)
            .with_context(|| format!("failed to look up user '{}'", name))?
            .ok_or_else(|| LaunchError::UserNotFound { user: name.to_string() })?;
        Ok(Self {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            home: user.dir,
        })
    }
}

/// 已决定以目标用户重新执行自身，等待 `exec`
#[derive(Debug)]
pub struct ReexecPending {
    account: TargetAccount,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ReexecPending {
    /// 从 Superuser 状态进入 ReexecPending
    ///
    /// 如果本进程已经是重新执行过的一轮，说明切换没有生效，直接报错而不是再跳一次
    pub fn plan(target_user: &str, marker: Option<OsString>) -> anyhow::Result<Self> {
        if let Some(from) = marker {
            log::error!(
                "Re-exec marker {}={:?} present but still running as root",
                REEXEC_MARKER_ENV,
                from
            );
            return Err(LaunchError::ReexecLoop { user: target_user.to_string() }.into());
        }

        let account = TargetAccount::lookup(target_user)?;
        let program = std::env::current_exe().context("failed to resolve current executable")?;
        let args = std::env::args_os().skip(1).collect();
        Ok(Self::new(account, program, args))
    }

    pub fn new(account: TargetAccount, program: PathBuf, args: Vec<OsString>) -> Self {
        Self { account, program, args }
    }

    pub fn account(&self) -> &TargetAccount {
        &self.account
    }

    /// 重新执行用的命令（不含降权步骤）
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("HOME", &self.account.home)
            .env("USER", &self.account.name)
            .env("LOGNAME", &self.account.name)
            .env(REEXEC_MARKER_ENV, "root");
        cmd
    }

    /// 降权并替换当前进程
    ///
    /// 只会在失败时返回；成功时进程映像已被替换
    pub fn exec(self) -> anyhow::Error {
        log::info!(
            "🔁 Re-executing {} as '{}' (uid={}, gid={})",
            self.program.display(),
            self.account.name,
            self.account.uid,
            self.account.gid
        );

        if let Err(e) = self.drop_privileges() {
            return e;
        }

        let err = self.command().exec();
        anyhow::Error::new(err).context(format!(
            "failed to re-exec {} as '{}'",
            self.program.display(),
            self.account.name
        ))
    }

    fn drop_privileges(&self) -> anyhow::Result<()> {
        let name = CString::new(self.account.name.as_str())
            .with_context(|| format!("invalid user name '{}'", self.account.name))?;

        // 顺序固定：附加组 -> gid -> uid，setuid 之后就没有权限改组了
        initgroups(&name, self.account.gid)
            .with_context(|| format!("initgroups for '{}' failed", self.account.name))?;
        setgid(self.account.gid)
            .with_context(|| format!("setgid({}) failed", self.account.gid))?;
        setuid(self.account.uid)
            .with_context(|| format!("setuid({}) failed", self.account.uid))?;
        Ok(())
    }
}
