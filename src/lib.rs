pub mod alerting;
pub mod config;
pub mod detection;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod monitor;

// Re-export commonly used types
pub use alerting::{ChannelRegistry, Message, NotificationChannel, NotificationDispatcher};
pub use config::Config;
pub use detection::{EventClassifier, EventGate};
pub use geolocation::GeoLocator;
pub use models::{Event, EventType, LogSource, LogType};
pub use monitor::{Monitor, MonitorError};
