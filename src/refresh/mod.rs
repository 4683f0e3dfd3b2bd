//! Refresh pipeline: coordinator, scheduler and liveness monitor

pub mod coordinator;
pub mod monitor;
pub mod scheduler;

pub use coordinator::{CycleReport, RefreshCoordinator};
pub use monitor::{CycleTrigger, DeviceHealth, RefreshMonitor};
pub use scheduler::{RefreshScheduler, SchedulerHandle, DEFAULT_FORCED_REFRESH};
