pub mod file_tailer;

pub use file_tailer::{EventSender, LogTailer, TailError};
