//! Background scheduling for the reconciliation sweep.

mod sweep_scheduler;

pub use sweep_scheduler::{SweepScheduler, SweepSchedulerConfig};
