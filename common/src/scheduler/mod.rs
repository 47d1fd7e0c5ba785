// Scheduler module: due-time tracking and the cycle loop

pub mod clock;
pub mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{CycleReport, DueTimeTable, Scheduler, SchedulerConfig, SchedulerEngine};
