use std::collections::HashSet;

use crate::config::Config;
use crate::models::{EventType, LogType};

/// Which event types may be materialized
///
/// Built once from configuration: an event type is enabled when at least
/// one enabled rule handles it.
#[derive(Debug, Clone, Default)]
pub struct EventGate {
    enabled: HashSet<EventType>,
}

impl EventGate {
    pub fn from_config(config: &Config) -> Self {
        let enabled = config
            .events
            .values()
            .filter(|rule| rule.enabled)
            .map(|rule| rule.event_type)
            .collect();
        EventGate { enabled }
    }

    pub fn only(types: &[EventType]) -> Self {
        EventGate {
            enabled: types.iter().copied().collect(),
        }
    }

    pub fn all() -> Self {
        Self::only(&[EventType::Ban, EventType::Fail, EventType::Success])
    }

    pub fn is_enabled(&self, event_type: EventType) -> bool {
        self.enabled.contains(&event_type)
    }

    /// Whether a log of this type can produce any enabled event
    pub fn monitors(&self, log_type: LogType) -> bool {
        match log_type {
            LogType::Fail2ban => {
                self.is_enabled(EventType::Ban) || self.is_enabled(EventType::Fail)
            }
            LogType::Auth => self.is_enabled(EventType::Success),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_ignores_disabled_rules() {
        let mut config = Config::default();
        config.events.get_mut("success").unwrap().enabled = false;

        let gate = EventGate::from_config(&config);
        assert!(gate.is_enabled(EventType::Ban));
        assert!(gate.is_enabled(EventType::Fail));
        assert!(!gate.is_enabled(EventType::Success));
    }

    #[test]
    fn test_monitors_by_log_type() {
        let gate = EventGate::only(&[EventType::Fail]);
        assert!(gate.monitors(LogType::Fail2ban));
        assert!(!gate.monitors(LogType::Auth));

        let gate = EventGate::only(&[EventType::Success]);
        assert!(!gate.monitors(LogType::Fail2ban));
        assert!(gate.monitors(LogType::Auth));
    }
}
