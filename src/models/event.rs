use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of security event a log line can turn into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Address banned by fail2ban
    Ban,
    /// Failed login attempt noticed by fail2ban
    Fail,
    /// Accepted SSH login
    Success,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Ban => "ban",
            EventType::Fail => "fail",
            EventType::Success => "success",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified security event, ready for dispatch
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: EventType,
    pub address: String,
    pub location: String,
    pub details: String,
    pub raw: String,
    pub detected_at: DateTime<Local>,
}

impl Event {
    /// Detection time in the format used by message templates
    pub fn time_string(&self) -> String {
        self.detected_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
