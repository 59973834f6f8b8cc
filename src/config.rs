use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::models::{EventType, LogSource, LogType};

/// Errors that can occur while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid restart time '{0}', expected HH:MM")]
    InvalidRestartTime(String),
}

/// Configuration for the logpush daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity of the monitored host, exposed to templates
    pub server: ServerConfig,
    /// Notification channels keyed by name
    #[serde(default)]
    pub notifiers: BTreeMap<String, NotifierConfig>,
    /// Event rules keyed by name
    #[serde(default)]
    pub events: BTreeMap<String, EventRule>,
    /// Log files to tail
    #[serde(default = "LogSource::defaults")]
    pub sources: Vec<LogSource>,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub restart: RestartConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub tag: String,
}

/// Provider family of a notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Fcm,
    Telegram,
    Bark,
    Wecom,
    Wxpusher,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Fcm => "fcm",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Bark => "bark",
            ChannelKind::Wecom => "wecom",
            ChannelKind::Wxpusher => "wxpusher",
        };
        f.write_str(name)
    }
}

/// A configured notification channel
///
/// Provider credentials stay untyped here and are checked by the
/// channel constructor registered for `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

/// Maps one event type to a message template and its destination channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRule {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub enabled: bool,
    pub title: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Channel names, in send order
    #[serde(default)]
    pub notifiers: Vec<String>,
}

/// IP geolocation lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub enabled: bool,
    /// Base URL; the address is appended as the last path segment
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * retry_delay_ms`
    pub retry_delay_ms: u64,
    pub cache_ttl_hours: i64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            enabled: true,
            endpoint: "https://api.ip.sb/geoip".to_string(),
            timeout_secs: 5,
            max_attempts: 3,
            retry_delay_ms: 1000,
            cache_ttl_hours: 24,
        }
    }
}

/// Daily restart of every tailer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub enabled: bool,
    /// Local wall-clock time, `HH:MM` or `HH:MM:SS`
    pub at: String,
}

impl Default for RestartConfig {
    fn default() -> Self {
        RestartConfig {
            enabled: true,
            at: "12:05".to_string(),
        }
    }
}

impl RestartConfig {
    pub fn time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.at, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&self.at, "%H:%M:%S"))
            .map_err(|_| ConfigError::InvalidRestartTime(self.at.clone()))
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut notifiers = BTreeMap::new();
        notifiers.insert(
            "telegram".to_string(),
            NotifierConfig {
                kind: ChannelKind::Telegram,
                enabled: false,
                config: serde_json::json!({
                    "webhook_url": "https://api.telegram.org/bot<token>/sendMessage",
                    "chat_id": "<chat id>",
                }),
            },
        );

        let template = "服务器: {{server.name}} ({{server.tag}})\n时间: {{time}}\n{{details}}";
        let rule = |event_type, title: &str| EventRule {
            event_type,
            enabled: true,
            title: title.to_string(),
            template: template.to_string(),
            icon: None,
            notifiers: vec!["telegram".to_string()],
        };

        let mut events = BTreeMap::new();
        events.insert("ban".to_string(), rule(EventType::Ban, "IP 封禁通知"));
        events.insert("fail".to_string(), rule(EventType::Fail, "登录失败通知"));
        events.insert("success".to_string(), rule(EventType::Success, "登录成功通知"));

        Config {
            server: ServerConfig {
                name: "my-server".to_string(),
                tag: "default".to_string(),
            },
            notifiers,
            events,
            sources: LogSource::defaults(),
            geo: GeoConfig::default(),
            restart: RestartConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = if is_json(path) {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };
        config.restart.time()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Whether any enabled rule handles this event type
    pub fn is_event_enabled(&self, event_type: EventType) -> bool {
        self.events
            .values()
            .any(|rule| rule.event_type == event_type && rule.enabled)
    }

    /// First enabled rule for this event type, in name order
    pub fn rule_for(&self, event_type: EventType) -> Option<&EventRule> {
        self.events
            .values()
            .find(|rule| rule.event_type == event_type && rule.enabled)
    }

    /// Human-readable warnings about settings that will silently drop events
    pub fn diagnostics(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, rule) in self.events.iter().filter(|(_, r)| r.enabled) {
            if rule.notifiers.is_empty() {
                warnings.push(format!("event '{}' has no notifiers", name));
            }
            for channel in &rule.notifiers {
                match self.notifiers.get(channel) {
                    None => warnings.push(format!(
                        "event '{}' references unknown notifier '{}'",
                        name, channel
                    )),
                    Some(n) if !n.enabled => warnings.push(format!(
                        "event '{}' references disabled notifier '{}'",
                        name, channel
                    )),
                    Some(_) => {}
                }
            }
        }

        for event_type in [EventType::Ban, EventType::Fail, EventType::Success] {
            if !self.is_event_enabled(event_type) {
                warnings.push(format!("no enabled rule for {} events", event_type));
            }
        }

        for source in self.sources.iter().filter(|s| s.enabled) {
            let needed: &[EventType] = match source.log_type {
                LogType::Fail2ban => &[EventType::Ban, EventType::Fail],
                LogType::Auth => &[EventType::Success],
            };
            if !needed.iter().any(|t| self.is_event_enabled(*t)) {
                warnings.push(format!(
                    "source {} will be skipped: no enabled events for log type {}",
                    source.path.display(),
                    source.log_type
                ));
            }
        }

        warnings
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
name = "web-1"
tag = "prod"

[notifiers.tg]
type = "telegram"
enabled = true
config = { webhook_url = "https://example.invalid/send", chat_id = "42" }

[notifiers.phone]
type = "bark"
enabled = false
config = { webhook_url = "https://api.day.app", device_token = "abc" }

[events.banned]
type = "ban"
enabled = true
title = "Ban"
template = "{{ip}} banned"
notifiers = ["tg", "phone", "missing"]

[events.login]
type = "success"
enabled = false
title = "Login"
template = "{{details}}"
notifiers = ["tg"]

[restart]
at = "03:30"
"#;

    #[test]
    fn test_parse_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.name, "web-1");
        assert_eq!(config.notifiers["tg"].kind, ChannelKind::Telegram);
        assert_eq!(config.notifiers["tg"].config["chat_id"], "42");
        assert_eq!(config.events["banned"].notifiers.len(), 3);
        // Omitted sections fall back to defaults
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.geo.max_attempts, 3);
        assert!(config.restart.enabled);
        assert_eq!(
            config.restart.time().unwrap(),
            NaiveTime::from_hms_opt(3, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "server": {"name": "db-1", "tag": "staging"},
            "notifiers": {
                "push": {"type": "wxpusher", "enabled": true,
                         "config": {"app_token": "AT_x", "uids": ["UID_1"]}}
            },
            "events": {
                "fail": {"type": "fail", "enabled": true, "title": "Fail",
                         "template": "{{details}}", "icon": "warn", "notifiers": ["push"]}
            }
        }"#;
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.notifiers["push"].kind, ChannelKind::Wxpusher);
        assert_eq!(config.events["fail"].icon.as_deref(), Some("warn"));
        assert!(config.is_event_enabled(EventType::Fail));
        assert!(!config.is_event_enabled(EventType::Ban));
    }

    #[test]
    fn test_invalid_restart_time_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[server]\nname = \"x\"\n[restart]\nat = \"25:99\"\n")
            .unwrap();
        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidRestartTime(_))));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.server, Config::default().server);
        assert_eq!(loaded.events.len(), 3);
        assert_eq!(loaded.sources, LogSource::defaults());
    }

    #[test]
    fn test_rule_lookup_skips_disabled() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.rule_for(EventType::Ban).unwrap().title, "Ban");
        assert!(config.rule_for(EventType::Success).is_none());
    }

    #[test]
    fn test_diagnostics() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let warnings = config.diagnostics();

        assert!(warnings.iter().any(|w| w.contains("disabled notifier 'phone'")));
        assert!(warnings.iter().any(|w| w.contains("unknown notifier 'missing'")));
        assert!(warnings.iter().any(|w| w == "no enabled rule for success events"));
        assert!(!warnings.iter().any(|w| w == "no enabled rule for ban events"));
        // auth sources have no enabled success rule
        assert!(warnings.iter().any(|w| w.contains("/var/log/auth.log")));
        assert!(!warnings.iter().any(|w| w.contains("fail2ban.log")));
    }
}
