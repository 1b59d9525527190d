//! Device view plugin: companion process supervision and settings sync
//!
//! This crate provides:
//! - Companion process launch (LaunchSpec, CompanionLauncher, OsLauncher)
//! - Process supervision with handshake, health timer, and restart
//! - Step-synchronous video switching (StepSynchronizer)
//! - The plugin orchestrator wired to host lifecycle hooks (UiPlugin)

pub mod error;
pub mod launch;
pub mod plugin;
pub mod step;
pub mod supervisor;

pub use error::PluginError;
pub use launch::{CompanionLauncher, CompanionProcess, LaunchSpec, OsLauncher};
pub use plugin::{LifecycleHook, PluginConfig, ScheduleRequest, SettingsStore, UiPlugin};
pub use step::{StepHost, StepOptions, StepSynchronizer};
pub use supervisor::{HealthState, ProcessSupervisor, SupervisorConfig};
