pub mod audio;
pub mod events;
pub mod log;

pub use events::{ClientEvent, ControlEvent};
pub use log::LogEntry;
