use thiserror::Error;

use crate::task::TaskHandle;

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// API misuse reported by scheduler operations. Task-body failures are a
/// separate concern, carried by [`TaskError`](crate::task::TaskError) and
/// absorbed at the execution boundary instead of being returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("repeat period must be non-zero")]
    ZeroPeriod,

    #[error("unknown task handle: {0}")]
    UnknownHandle(TaskHandle),
}
