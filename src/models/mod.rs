pub mod launch;
pub mod process;

pub use launch::{LaunchConfig, TriggerMode};
pub use process::{ProcessFingerprint, ProcessRecord};
