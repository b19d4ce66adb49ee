pub mod scheduler;
pub mod window;

pub use scheduler::{
    AttemptError, AttemptScheduler, BlockReason, SchedulePolicy, ScheduleResult,
};
pub use window::{RegionWindow, WindowCalculator};
