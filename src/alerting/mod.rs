//! Alerting module for push notifications
//!
//! Events are rendered through their rule's template and fanned out to
//! every channel the rule names. Channels are a closed set of providers
//! (FCM, Telegram, Bark, WeCom, WxPusher) built from configuration by an
//! explicit [`ChannelRegistry`].

pub mod channel;
pub mod dispatcher;
pub mod registry;
pub mod template;

pub use channel::NotificationChannel;
pub use dispatcher::{EventReceiver, NotificationDispatcher};
pub use registry::{ChannelConstructor, ChannelRegistry, ChannelSpec};
pub use template::{TemplateContext, TemplateRenderer};

use crate::config::ChannelKind;
use crate::models::EventType;
use thiserror::Error;

/// A rendered notification, ready to hand to a channel
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Errors from a single channel send or channel construction
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid channel config for '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("No constructor registered for channel type {0}")]
    Unregistered(ChannelKind),
}

/// Errors that can occur while dispatching one event
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No enabled rule for {0} events")]
    NoMatchingRule(EventType),

    #[error("Template render failed: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("Rule references unknown notifier '{0}'")]
    UnknownChannel(String),

    #[error("Notifier '{channel}' failed: {source}")]
    Channel {
        channel: String,
        #[source]
        source: ChannelError,
    },

    #[error("Failed to build notifier: {0}")]
    Setup(#[from] ChannelError),
}
