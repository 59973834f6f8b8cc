//! Channel construction from configuration

use serde::de::DeserializeOwned;
use std::collections::HashMap;

use super::channel::{BarkConfig, FcmConfig, TelegramConfig, WeComConfig, WxPusherConfig};
use super::{ChannelError, NotificationChannel};
use crate::config::{ChannelKind, Config, ServerConfig};

/// Everything a constructor needs to build one channel
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec<'a> {
    pub name: &'a str,
    pub config: &'a serde_json::Value,
    pub server: &'a ServerConfig,
}

pub type ChannelConstructor = fn(&ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError>;

/// Maps channel types to their constructors
///
/// Built once at startup and passed to whatever assembles channels.
#[derive(Clone)]
pub struct ChannelRegistry {
    constructors: HashMap<ChannelKind, ChannelConstructor>,
}

impl ChannelRegistry {
    /// An empty registry
    pub fn new() -> Self {
        ChannelRegistry {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every built-in provider
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(ChannelKind::Fcm, build_fcm)
            .register(ChannelKind::Telegram, build_telegram)
            .register(ChannelKind::Bark, build_bark)
            .register(ChannelKind::Wecom, build_wecom)
            .register(ChannelKind::Wxpusher, build_wxpusher);
        registry
    }

    pub fn register(&mut self, kind: ChannelKind, constructor: ChannelConstructor) -> &mut Self {
        self.constructors.insert(kind, constructor);
        self
    }

    pub fn build(&self, kind: ChannelKind, spec: &ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError> {
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or(ChannelError::Unregistered(kind))?;
        constructor(spec)
    }

    /// Build every enabled notifier in the configuration, keyed by name
    pub fn build_enabled(&self, config: &Config) -> Result<HashMap<String, NotificationChannel>, ChannelError> {
        let mut channels = HashMap::new();
        for (name, notifier) in config.notifiers.iter().filter(|(_, n)| n.enabled) {
            let spec = ChannelSpec {
                name,
                config: &notifier.config,
                server: &config.server,
            };
            channels.insert(name.clone(), self.build(notifier.kind, &spec)?);
        }
        Ok(channels)
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn parse<T: DeserializeOwned>(spec: &ChannelSpec<'_>) -> Result<T, ChannelError> {
    serde_json::from_value(spec.config.clone()).map_err(|e| ChannelError::InvalidConfig {
        name: spec.name.to_string(),
        reason: e.to_string(),
    })
}

fn build_fcm(spec: &ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError> {
    Ok(NotificationChannel::Fcm(parse::<FcmConfig>(spec)?))
}

fn build_telegram(spec: &ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError> {
    Ok(NotificationChannel::Telegram(parse::<TelegramConfig>(spec)?))
}

fn build_bark(spec: &ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError> {
    Ok(NotificationChannel::Bark(parse::<BarkConfig>(spec)?))
}

fn build_wecom(spec: &ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError> {
    Ok(NotificationChannel::WeCom(parse::<WeComConfig>(spec)?))
}

fn build_wxpusher(spec: &ChannelSpec<'_>) -> Result<NotificationChannel, ChannelError> {
    let config: WxPusherConfig = parse(spec)?;
    let invalid = |reason: &str| ChannelError::InvalidConfig {
        name: spec.name.to_string(),
        reason: reason.to_string(),
    };

    if config.app_token.is_empty() {
        return Err(invalid("app_token must not be empty"));
    }
    if config.uids.is_empty() {
        return Err(invalid("uids must not be empty"));
    }

    Ok(NotificationChannel::WxPusher {
        config,
        server_name: spec.server.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifierConfig;

    fn spec<'a>(config: &'a serde_json::Value, server: &'a ServerConfig) -> ChannelSpec<'a> {
        ChannelSpec {
            name: "test",
            config,
            server,
        }
    }

    #[test]
    fn test_builds_each_kind() {
        let server = ServerConfig::default();
        let registry = ChannelRegistry::with_defaults();
        let cases = [
            (ChannelKind::Fcm, serde_json::json!({"webhook_url": "https://f", "device_token": "d"})),
            (ChannelKind::Telegram, serde_json::json!({"webhook_url": "https://t", "chat_id": "1"})),
            (ChannelKind::Bark, serde_json::json!({"webhook_url": "https://b", "device_token": "d"})),
            (ChannelKind::Wecom, serde_json::json!({"webhook_url": "https://w", "send_key": "k"})),
            (ChannelKind::Wxpusher, serde_json::json!({"app_token": "AT", "uids": ["U"]})),
        ];

        for (kind, config) in cases {
            let channel = registry.build(kind, &spec(&config, &server)).unwrap();
            assert_eq!(channel.kind(), kind);
        }
    }

    #[test]
    fn test_missing_field_is_invalid_config() {
        let server = ServerConfig::default();
        let config = serde_json::json!({"webhook_url": "https://t"});
        let result = ChannelRegistry::with_defaults().build(ChannelKind::Telegram, &spec(&config, &server));
        assert!(matches!(result, Err(ChannelError::InvalidConfig { .. })));
    }

    #[test]
    fn test_wxpusher_requires_uids() {
        let server = ServerConfig::default();
        let config = serde_json::json!({"app_token": "AT", "uids": []});
        let result = ChannelRegistry::with_defaults().build(ChannelKind::Wxpusher, &spec(&config, &server));
        assert!(matches!(result, Err(ChannelError::InvalidConfig { .. })));
    }

    #[test]
    fn test_unregistered_kind() {
        let server = ServerConfig::default();
        let config = serde_json::json!({});
        let result = ChannelRegistry::new().build(ChannelKind::Bark, &spec(&config, &server));
        assert!(matches!(result, Err(ChannelError::Unregistered(ChannelKind::Bark))));
    }

    #[test]
    fn test_build_enabled_skips_disabled() {
        let mut config = Config::default();
        config.notifiers.insert(
            "bark".to_string(),
            NotifierConfig {
                kind: ChannelKind::Bark,
                enabled: true,
                config: serde_json::json!({"webhook_url": "https://api.day.app", "device_token": "x"}),
            },
        );

        let channels = ChannelRegistry::with_defaults().build_enabled(&config).unwrap();
        assert_eq!(channels.len(), 1);
        assert!(channels.contains_key("bark"));
        assert!(!channels.contains_key("telegram"));
    }
}
