//! Push notification providers

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};

use super::{ChannelError, Message};
use crate::config::ChannelKind;

/// Firebase Cloud Messaging relay webhook
#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    pub webhook_url: String,
    pub device_token: String,
}

/// Telegram bot `sendMessage` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub webhook_url: String,
    pub chat_id: String,
}

/// Bark server, e.g. `https://api.day.app`
#[derive(Debug, Clone, Deserialize)]
pub struct BarkConfig {
    pub webhook_url: String,
    pub device_token: String,
}

/// WeCom relay (`wecomchan`)
#[derive(Debug, Clone, Deserialize)]
pub struct WeComConfig {
    pub webhook_url: String,
    pub send_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WxPusherConfig {
    pub app_token: String,
    pub uids: Vec<String>,
    #[serde(default = "default_wxpusher_api")]
    pub api_url: String,
}

fn default_wxpusher_api() -> String {
    "https://wxpusher.zjiecode.com/api/send/message".to_string()
}

/// A configured destination for rendered messages
#[derive(Debug, Clone)]
pub enum NotificationChannel {
    Fcm(FcmConfig),
    Telegram(TelegramConfig),
    Bark(BarkConfig),
    WeCom(WeComConfig),
    WxPusher {
        config: WxPusherConfig,
        /// Used in the message summary
        server_name: String,
    },
}

#[derive(Serialize)]
struct FcmPayload<'a> {
    data: FcmData<'a>,
}

#[derive(Serialize)]
struct FcmData<'a> {
    to: &'a str,
    ttl: u32,
    priority: &'a str,
    data: FcmInner<'a>,
}

#[derive(Serialize)]
struct FcmInner<'a> {
    text: FcmText<'a>,
}

#[derive(Serialize)]
struct FcmText<'a> {
    title: &'a str,
    message: &'a str,
    clipboard: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WxPusherRequest<'a> {
    app_token: &'a str,
    content: &'a str,
    summary: String,
    content_type: u8,
    uids: &'a [String],
    verify_pay: bool,
    verify_pay_type: u8,
}

impl NotificationChannel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            NotificationChannel::Fcm(_) => ChannelKind::Fcm,
            NotificationChannel::Telegram(_) => ChannelKind::Telegram,
            NotificationChannel::Bark(_) => ChannelKind::Bark,
            NotificationChannel::WeCom(_) => ChannelKind::Wecom,
            NotificationChannel::WxPusher { .. } => ChannelKind::Wxpusher,
        }
    }

    /// Deliver a message through this provider
    pub async fn send(&self, client: &Client, message: &Message) -> Result<(), ChannelError> {
        let response = match self {
            NotificationChannel::Fcm(config) => {
                let payload = FcmPayload {
                    data: FcmData {
                        to: &config.device_token,
                        ttl: 60,
                        priority: "high",
                        data: FcmInner {
                            text: FcmText {
                                title: &message.title,
                                message: &message.content,
                                clipboard: false,
                            },
                        },
                    },
                };
                client.post(&config.webhook_url).json(&payload).send().await?
            }
            NotificationChannel::Telegram(config) => {
                client
                    .get(&config.webhook_url)
                    .query(&[("chat_id", config.chat_id.as_str()), ("text", message.content.as_str())])
                    .send()
                    .await?
            }
            NotificationChannel::Bark(config) => {
                let url = bark_url(config, &message.content)?;
                client.get(url).send().await?
            }
            NotificationChannel::WeCom(config) => {
                client
                    .get(&config.webhook_url)
                    .query(&[
                        ("sendkey", config.send_key.as_str()),
                        ("msg_type", "text"),
                        ("msg", message.content.as_str()),
                    ])
                    .send()
                    .await?
            }
            NotificationChannel::WxPusher {
                config,
                server_name,
            } => {
                let request = WxPusherRequest {
                    app_token: &config.app_token,
                    content: &message.content,
                    summary: format!("{} - {}", server_name, message.title),
                    content_type: 1,
                    uids: &config.uids,
                    verify_pay: false,
                    verify_pay_type: 0,
                };
                client.post(&config.api_url).json(&request).send().await?
            }
        };

        check_status(response).await
    }
}

/// `<webhook_url>/<device_token>/<content>`, with each segment escaped
fn bark_url(config: &BarkConfig, content: &str) -> Result<Url, ChannelError> {
    let invalid = |reason: String| ChannelError::InvalidConfig {
        name: "bark".to_string(),
        reason,
    };

    let mut url = Url::parse(&config.webhook_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("{} cannot take a path", config.webhook_url)))?
        .pop_if_empty()
        .push(&config.device_token)
        .push(content);
    Ok(url)
}

async fn check_status(response: Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(ChannelError::Status {
        status: status.as_u16(),
        body,
    })
}
