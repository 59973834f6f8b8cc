pub mod event;
pub mod source;

pub use event::{Event, EventType};
pub use source::{LogSource, LogType};
