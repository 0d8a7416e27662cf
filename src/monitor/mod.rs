pub mod controller;
pub mod events;
mod loop_worker;
pub mod state;

pub use controller::{MonitorController, MonitorSettings};
pub use events::{CyclePhase, MonitorEvent};
pub use state::{MonitorStatus, SessionStats};
