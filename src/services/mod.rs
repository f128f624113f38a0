pub mod environment;
pub mod launcher;
pub mod privilege;
pub mod process_checker;
pub mod readiness;

pub use launcher::DetachedSpawner;
pub use privilege::{PrivilegeState, REEXEC_MARKER_ENV};
pub use process_checker::SysinfoProcessTable;
