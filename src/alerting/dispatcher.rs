use reqwest::Client;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::registry::ChannelRegistry;
use super::template::{TemplateContext, TemplateRenderer};
use super::{ChannelError, DispatchError, Message, NotificationChannel};
use crate::config::{Config, EventRule, ServerConfig};
use crate::models::Event;

/// Consumer side of the shared event queue
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Renders events and fans them out to their rule's channels
///
/// Sends are independent: one channel failing never stops delivery to
/// the channels after it.
pub struct NotificationDispatcher {
    server: ServerConfig,
    rules: BTreeMap<String, EventRule>,
    channels: HashMap<String, NotificationChannel>,
    disabled: HashSet<String>,
    renderer: TemplateRenderer,
    client: Client,
}

impl NotificationDispatcher {
    /// Build the dispatcher and every enabled channel
    pub fn new(config: &Config, registry: &ChannelRegistry) -> Result<Self, DispatchError> {
        let channels = registry.build_enabled(config)?;
        let disabled = config
            .notifiers
            .iter()
            .filter(|(_, n)| !n.enabled)
            .map(|(name, _)| name.clone())
            .collect();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ChannelError::Http)?;

        Ok(NotificationDispatcher {
            server: config.server.clone(),
            rules: config.events.clone(),
            channels,
            disabled,
            renderer: TemplateRenderer::new(),
            client,
        })
    }

    /// Run the dispatch loop until every producer has hung up
    pub async fn run(self: Arc<Self>, mut rx: EventReceiver) {
        log::info!("Notification dispatcher started");

        while let Some(event) = rx.recv().await {
            match self.dispatch(&event).await {
                Ok(()) => log::info!("Sent notification: {}", event.details),
                Err(e) => log::error!(
                    "Notification for {} event from {} failed: {}",
                    event.event_type,
                    event.address,
                    e
                ),
            }
        }

        log::info!("Notification dispatcher stopped");
    }

    /// Render and send one event
    ///
    /// Returns the last channel failure, if any. Channels that succeeded
    /// before or after it have still been sent to.
    pub async fn dispatch(&self, event: &Event) -> Result<(), DispatchError> {
        let rule = self
            .rules
            .values()
            .find(|rule| rule.event_type == event.event_type && rule.enabled)
            .ok_or(DispatchError::NoMatchingRule(event.event_type))?;

        let context = TemplateContext::new(&self.server, event);
        let content = self.renderer.render(&rule.template, &context)?;

        let mut metadata = context.to_metadata();
        if let Some(icon) = &rule.icon {
            metadata.insert("icon".to_string(), icon.clone().into());
        }
        let message = Message {
            title: rule.title.clone(),
            content,
            metadata,
        };

        let mut last_error = None;
        for name in &rule.notifiers {
            match self.channels.get(name) {
                Some(channel) => {
                    if let Err(e) = channel.send(&self.client, &message).await {
                        log::warn!("Notifier {} ({}) failed: {}", name, channel.kind(), e);
                        last_error = Some(DispatchError::Channel {
                            channel: name.clone(),
                            source: e,
                        });
                    } else {
                        log::debug!("Delivered {} event via {}", event.event_type, name);
                    }
                }
                None if self.disabled.contains(name) => {
                    log::debug!("Skipping disabled notifier {}", name);
                }
                None => {
                    log::warn!("Rule '{}' references unknown notifier {}", rule.title, name);
                    last_error = Some(DispatchError::UnknownChannel(name.clone()));
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
