//! Log line classification
//!
//! Turns raw lines into ban / failed-login / successful-login events.

use chrono::Local;
use std::sync::Arc;

use super::address::extract_address;
use super::gate::EventGate;
use crate::geolocation::GeoLocator;
use crate::models::{Event, EventType, LogSource, LogType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginMethod {
    Password,
    PublicKey,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Ban,
    Fail,
    Success(LoginMethod),
}

impl LineKind {
    fn of(line: &str, log_type: LogType) -> Option<Self> {
        match log_type {
            LogType::Fail2ban if line.contains("Ban") => Some(LineKind::Ban),
            LogType::Fail2ban if line.contains("Found") => Some(LineKind::Fail),
            LogType::Auth if line.contains("Accepted") => {
                let method = if line.contains("password") {
                    LoginMethod::Password
                } else if line.contains("publickey") {
                    LoginMethod::PublicKey
                } else {
                    LoginMethod::Other
                };
                Some(LineKind::Success(method))
            }
            _ => None,
        }
    }

    fn event_type(&self) -> EventType {
        match self {
            LineKind::Ban => EventType::Ban,
            LineKind::Fail => EventType::Fail,
            LineKind::Success(_) => EventType::Success,
        }
    }

    fn details(&self, address: &str, location: &str) -> String {
        match self {
            LineKind::Ban => format!("IP {}[{}] 已被 fail2ban 封禁", address, location),
            LineKind::Fail => format!("检测到来自 IP {}[{}] 的失败登录尝试", address, location),
            LineKind::Success(LoginMethod::Password) => format!("IP {} 密码登录成功", address),
            LineKind::Success(LoginMethod::PublicKey) => {
                format!("IP {}[{}] 密钥登录成功", address, location)
            }
            LineKind::Success(LoginMethod::Other) => {
                format!("IP {}[{}] 登录成功", address, location)
            }
        }
    }
}

/// Classifies log lines into events, enriching them with a location
pub struct EventClassifier {
    gate: EventGate,
    geo: Arc<GeoLocator>,
}

impl EventClassifier {
    pub fn new(gate: EventGate, geo: Arc<GeoLocator>) -> Self {
        EventClassifier { gate, geo }
    }

    pub fn gate(&self) -> &EventGate {
        &self.gate
    }

    /// Classify one line read from `source`
    ///
    /// Only the first pattern found in the line is considered. If that
    /// match yields a disabled or incomplete event, the line produces
    /// nothing; later patterns are not tried.
    pub async fn classify(&self, line: &str, source: &LogSource) -> Option<Event> {
        let pattern = source
            .patterns
            .iter()
            .find(|pattern| line.contains(pattern.as_str()))?;

        let kind = LineKind::of(line, source.log_type)?;
        let event_type = kind.event_type();
        if !self.gate.is_enabled(event_type) {
            log::debug!("'{}' matched but {} events are disabled", pattern, event_type);
            return None;
        }

        let address = extract_address(line)?;
        let location = self.geo.resolve(&address).await;

        Some(Event {
            event_type,
            details: kind.details(&address, &location),
            address,
            location,
            raw: line.to_string(),
            detected_at: Local::now(),
        })
    }
}
