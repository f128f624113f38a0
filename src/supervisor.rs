use std::ffi::OsString;

use crate::config::Settings;
use crate::services::launcher::{self, LaunchPlan, Spawner};
use crate::services::privilege::{PrivilegeState, ReexecPending};
use crate::services::process_checker::{is_already_running, ProcessTable};
use crate::services::readiness::{wait_for, WaitPolicy};

/// 权限检查之后的下一步
#[derive(Debug)]
pub enum Stage {
    /// 以 root 运行：交给目标用户重新执行
    Handoff(ReexecPending),
    /// 普通用户：继续单实例检查和启动
    Proceed,
}

/// 一次启动的结果
#[derive(Debug)]
pub enum Outcome {
    AlreadyRunning(u32),
    Launched(u32),
    DryRun(LaunchPlan),
}

/// 按顺序执行：就绪等待 -> 降权 -> 单实例检查 -> 启动
pub struct Supervisor<'a, T: ProcessTable + ?Sized, S: Spawner + ?Sized> {
    settings: &'a Settings,
    table: &'a T,
    spawner: &'a mut S,
    dry_run: bool,
}

impl<'a, T: ProcessTable + ?Sized, S: Spawner + ?Sized> Supervisor<'a, T, S> {
    pub fn new(settings: &'a Settings, table: &'a T, spawner: &'a mut S) -> Self {
        Self {
            settings,
            table,
            spawner,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// root 时先等待桌面会话，再准备以目标用户重新执行
    pub fn check_privileges(
        &self,
        state: &PrivilegeState,
        reexec_marker: Option<OsString>,
    ) -> anyhow::Result<Stage> {
        match state {
            PrivilegeState::Unprivileged { user } => {
                log::info!("Running as '{}'", user);
                Ok(Stage::Proceed)
            }
            PrivilegeState::Superuser => {
                log::info!(
                    "Running as root, waiting for session {} before switching to '{}'",
                    self.settings.session,
                    self.settings.target_user
                );
                wait_for(
                    self.table,
                    &self.settings.session,
                    WaitPolicy::seconds(self.settings.session_timeout),
                );
                let pending = ReexecPending::plan(&self.settings.target_user, reexec_marker)?;
                Ok(Stage::Handoff(pending))
            }
        }
    }

    /// 单实例检查通过后启动服务
    pub fn start(&mut self) -> anyhow::Result<Outcome> {
        if let Some(pid) = is_already_running(self.table, &self.settings.service)? {
            log::info!("doorman is already running with PID {}", pid);
            return Ok(Outcome::AlreadyRunning(pid));
        }

        let plan = launcher::prepare(&self.settings.launch)?;
        if self.dry_run {
            return Ok(Outcome::DryRun(plan));
        }

        let pid = launcher::launch(&plan, &mut *self.spawner)?;
        Ok(Outcome::Launched(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LaunchError;
    use crate::models::{LaunchConfig, ProcessRecord};
    use crate::services::launcher::tests::RecordingSpawner;
    use crate::services::process_checker::tests::FakeProcessTable;
    use std::path::Path;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            launch: LaunchConfig {
                log_path: dir.join("doorman.log"),
                working_directory: dir.to_path_buf(),
                environment_sources: vec![dir.join("profile"), dir.join(".profile")],
                info_file: None,
                ..LaunchConfig::default()
            },
            session_timeout: 0,
            ..Settings::default()
        }
    }

    fn service(pid: u32) -> ProcessRecord {
        ProcessRecord::new(pid, "python3", "python3 src/main.py --cloud-speech --trigger=gpio")
    }

    fn unprivileged() -> PrivilegeState {
        PrivilegeState::Unprivileged { user: "pi".to_string() }
    }

    #[test]
    fn test_unprivileged_proceeds_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            session_timeout: 30,
            ..settings_in(dir.path())
        };
        let table = FakeProcessTable::empty();
        let mut spawner = RecordingSpawner::default();
        let supervisor = Supervisor::new(&settings, &table, &mut spawner);

        let stage = supervisor.check_privileges(&unprivileged(), None).unwrap();
        assert!(matches!(stage, Stage::Proceed));
        assert_eq!(table.snapshots.get(), 0);
    }

    #[test]
    fn test_superuser_plans_single_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            target_user: "root".to_string(),
            ..settings_in(dir.path())
        };
        let table = FakeProcessTable::empty();
        let mut spawner = RecordingSpawner::default();
        let supervisor = Supervisor::new(&settings, &table, &mut spawner);

        match supervisor.check_privileges(&PrivilegeState::Superuser, None).unwrap() {
            Stage::Handoff(pending) => assert_eq!(pending.account().name, "root"),
            Stage::Proceed => panic!("root must hand off"),
        }
        assert!(spawner.spawned.is_empty());
    }

    #[test]
    fn test_superuser_after_reexec_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let table = FakeProcessTable::empty();
        let mut spawner = RecordingSpawner::default();
        let supervisor = Supervisor::new(&settings, &table, &mut spawner);

        let err = supervisor
            .check_privileges(&PrivilegeState::Superuser, Some(OsString::from("root")))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::ReexecLoop { .. })
        ));
    }

    #[test]
    fn test_already_running_never_launches() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let table = FakeProcessTable::new(vec![service(812)]);
        let mut spawner = RecordingSpawner::default();

        let outcome = Supervisor::new(&settings, &table, &mut spawner).start().unwrap();

        assert!(matches!(outcome, Outcome::AlreadyRunning(812)));
        assert!(spawner.spawned.is_empty());
        assert!(!settings.launch.log_path.exists());
    }

    #[test]
    fn test_ambiguous_instances_abort() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let table = FakeProcessTable::new(vec![service(812), service(813)]);
        let mut spawner = RecordingSpawner::default();

        let err = Supervisor::new(&settings, &table, &mut spawner).start().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::AmbiguousInstance { .. })
        ));
        assert!(spawner.spawned.is_empty());
    }

    #[test]
    fn test_clean_start_launches_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("profile"), "DOORMAN_STAGE=first\n").unwrap();
        std::fs::write(dir.path().join(".profile"), "DOORMAN_STAGE=second\n").unwrap();
        let settings = settings_in(dir.path());
        let table = FakeProcessTable::new(vec![ProcessRecord::new(1, "systemd", "/sbin/init")]);
        let mut spawner = RecordingSpawner::default();

        let outcome = Supervisor::new(&settings, &table, &mut spawner).start().unwrap();

        assert!(matches!(outcome, Outcome::Launched(4242)));
        assert_eq!(spawner.spawned.len(), 1);
        let plan = &spawner.spawned[0];
        assert_eq!(plan.args, vec!["--cloud-speech", "--trigger=gpio"]);
        assert_eq!(plan.env["DOORMAN_STAGE"], "second");

        let log = std::fs::read_to_string(&settings.launch.log_path).unwrap();
        assert!(log.starts_with("=== doorman starting at "));
    }

    #[test]
    fn test_dry_run_does_not_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let table = FakeProcessTable::empty();
        let mut spawner = RecordingSpawner::default();

        let outcome = Supervisor::new(&settings, &table, &mut spawner)
            .dry_run(true)
            .start()
            .unwrap();

        match outcome {
            Outcome::DryRun(plan) => assert_eq!(plan.program, dir.path().join("src/main.py")),
            other => panic!("expected dry run, got {:?}", other),
        }
        assert!(spawner.spawned.is_empty());
        assert!(!settings.launch.log_path.exists());
    }
}
