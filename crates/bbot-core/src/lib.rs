#![forbid(unsafe_code)]

//! Firmware core: cooperative task scheduling, power policy and logging.
//!
//! Everything here runs on a single loop thread. The [`Scheduler`] owns the
//! task table and the idle loop, [`PowerPolicy`] decides when idle gaps may
//! become low-power excursions, and [`Logging`] fans messages out to the
//! registered sinks. Host builds and tests drive the loop deterministically
//! through [`ManualClock`] and [`ManualLowPower`].

pub mod clock;
pub mod error;
pub mod idle;
pub mod logging;
pub mod power;
pub mod scheduler;
pub mod task;

pub use clock::{Clock, ManualClock};
pub use error::{Result, SchedulerError};
pub use idle::{IdleChoice, choose_idle, wants_maintenance};
pub use logging::{
    CONTINUATION_MARK, Level, LogRouter, LogSink, Logging, MESSAGE_LIMIT, MemorySink, TracingSink,
};
pub use power::{HostSleepDriver, LowPowerDriver, ManualLowPower, PowerPlan, PowerPolicy};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use task::{TaskError, TaskHandle, TaskResult};
