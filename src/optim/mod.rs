pub mod adam;
pub mod scheduler;

pub use adam::{Adam, AdamState};
pub use scheduler::{LrPolicy, LrScheduler, SchedulerState};
