use serde::{Deserialize, Serialize};

use crate::error::LaunchError;

/// 进程指纹：用于在进程表中识别某个服务实例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFingerprint {
    /// 可执行文件名
    pub binary_name: String,
    /// 命令行中必须包含的唯一参数片段
    #[serde(default)]
    pub argument_substring: String,
}

impl ProcessFingerprint {
    pub fn new(binary_name: impl Into<String>, argument_substring: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            argument_substring: argument_substring.into(),
        }
    }

    /// 空的可执行文件名会匹配所有进程，直接拒绝
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.binary_name.trim().is_empty() {
            return Err(LaunchError::InvalidFingerprint(format!(
                "binary name must not be empty (argument '{}')",
                self.argument_substring
            )));
        }
        Ok(())
    }

    /// 进程名完全相等，且命令行包含参数片段（就绪等待使用）
    pub fn matches_name(&self, record: &ProcessRecord) -> bool {
        record.name == self.binary_name && record.command_line.contains(&self.argument_substring)
    }

    /// 命令行同时包含可执行文件名和参数片段（单实例检查使用）
    pub fn matches_cmdline(&self, record: &ProcessRecord) -> bool {
        record.command_line.contains(&self.binary_name)
            && record.command_line.contains(&self.argument_substring)
    }
}

impl std::fmt::Display for ProcessFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.binary_name, self.argument_substring)
    }
}

/// 进程表快照中的一条记录，每次检查都重新读取，不做缓存
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
}

impl ProcessRecord {
    pub fn new(pid: u32, name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            command_line: command_line.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doorman() -> ProcessFingerprint {
        ProcessFingerprint::new("python", "src/main.py")
    }

    #[test]
    fn test_empty_binary_name_rejected() {
        assert!(ProcessFingerprint::new("  ", "main.py").validate().is_err());
        assert!(ProcessFingerprint::new("python3", "").validate().is_ok());
    }

    #[test]
    fn test_cmdline_match_needs_both_parts() {
        let fp = doorman();
        let hit = ProcessRecord::new(
            10,
            "python3",
            "/home/pi/AIY-voice-kit-python/env/bin/python3 src/main.py --cloud-speech --trigger=gpio",
        );
        let other_script = ProcessRecord::new(11, "python3", "python3 src/other.py");
        let editor = ProcessRecord::new(12, "vim", "vim src/main.py");

        assert!(fp.matches_cmdline(&hit));
        assert!(!fp.matches_cmdline(&other_script));
        assert!(!fp.matches_cmdline(&editor));
    }

    #[test]
    fn test_name_match_requires_exact_name() {
        let fp = ProcessFingerprint::new("lxsession", "LXDE-pi");
        let session = ProcessRecord::new(500, "lxsession", "/usr/bin/lxsession -s LXDE-pi -e LXDE");
        let lookalike = ProcessRecord::new(501, "lxsession-logout", "lxsession-logout LXDE-pi");

        assert!(fp.matches_name(&session));
        assert!(!fp.matches_name(&lookalike));
        // 命令行匹配只看子串，所以会命中
        assert!(fp.matches_cmdline(&lookalike));
    }
}
