use clap::Parser;

mod cli;
mod config;
mod error;
mod models;
mod services;
mod supervisor;

use cli::CommandArgs;
use config::Settings;
use services::{DetachedSpawner, PrivilegeState, SysinfoProcessTable, REEXEC_MARKER_ENV};
use supervisor::{Outcome, Stage, Supervisor};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    if let Err(e) = run(&args) {
        log::error!("❌ doorman launcher failed: {}", e);
        log::error!("   Full error chain:");
        for cause in e.chain() {
            log::error!("     - {}", cause);
        }
        std::process::exit(1);
    }
}

fn run(args: &CommandArgs) -> anyhow::Result<()> {
    let settings = Settings::resolve(args)?;
    print_banner(&settings, args.dry_run);

    let table = SysinfoProcessTable::new();
    let mut spawner = DetachedSpawner;
    let mut supervisor = Supervisor::new(&settings, &table, &mut spawner).dry_run(args.dry_run);

    let state = PrivilegeState::detect();
    match supervisor.check_privileges(&state, std::env::var_os(REEXEC_MARKER_ENV))? {
        Stage::Handoff(pending) => {
            if args.dry_run {
                println!("Dry run: would re-exec as '{}'", pending.account().name);
                return Ok(());
            }
            // 只有失败才会走到这里
            return Err(pending.exec());
        }
        Stage::Proceed => {}
    }

    match supervisor.start()? {
        Outcome::AlreadyRunning(pid) => {
            println!("doorman already running: PID {}", pid);
        }
        Outcome::Launched(pid) => {
            println!("doorman started: PID {}", pid);
        }
        Outcome::DryRun(plan) => {
            println!("Dry run, would launch:");
            println!("  {}", plan.command_line());
            println!("  cwd: {}", plan.working_directory.display());
            println!("  log: {}", plan.log_path.display());
        }
    }
    Ok(())
}

fn print_banner(settings: &Settings, dry_run: bool) {
    log::info!("Doorman Launcher v{}", env!("CARGO_PKG_VERSION"));
    log::info!("  service dir : {}", settings.launch.working_directory.display());
    log::info!("  log file    : {}", settings.log_path().display());
    log::info!("  trigger     : {}", settings.launch.trigger_mode);
    log::info!("  target user : {}", settings.target_user);
    if dry_run {
        log::info!("  dry run     : nothing will be started");
    }
}
