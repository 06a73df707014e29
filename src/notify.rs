use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::config::{NotificationTarget, Webhook};
use crate::discord::{DiscordManager, MessageBuilder};
use crate::services::NotificationService;
use crate::services::gateway::GatewayClient;

/// Delivers narratives to the configured topic, Discord or webhook target
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    target: Option<NotificationTarget>,
    discord_manager: DiscordManager,

    /// Needed for topic targets only
    gateway: Option<GatewayClient>,
}

impl Notifier {
    pub fn new(target: Option<NotificationTarget>) -> Self {
        Self {
            client: Client::new(),
            target,
            discord_manager: DiscordManager::new(),
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: GatewayClient) -> Self {
        self.gateway = Some(gateway);
        self
    }

    #[instrument(skip(self, message))]
    async fn send_topic(&self, topic: &str, message: &str) {
        let Some(gateway) = &self.gateway else {
            error!("No gateway available for topic {topic}, dropping notification");
            return;
        };

        match gateway.publish_to_topic(topic, message).await {
            Ok(()) => info!("Successfully published notification to topic"),
            Err(e) => error!("Failed to publish notification to topic: {}", e),
        }
    }

    #[instrument(skip(self, webhook, message))]
    async fn send_webhook(&self, webhook: &Webhook, message: &str) {
        let payload = json!({
            "message": message,
            "source": "volume-autoscaler",
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook notification");
                } else {
                    error!("Webhook notification failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook notification: {}", e);
            }
        }
    }
}

#[async_trait]
impl NotificationService for Notifier {
    async fn publish(&self, message: &str) {
        match &self.target {
            Some(NotificationTarget::Discord(discord)) => {
                let embed = self.discord_manager.build_narrative_embed(message);
                let mut message_builder = MessageBuilder::new().add_embed(embed);
                if let Some(user_id) = &discord.user_id {
                    message_builder = message_builder.content(format!("💾 <@{user_id}>"));
                }

                self.discord_manager
                    .send_message(discord, &message_builder.build())
                    .await;
            }
            Some(NotificationTarget::Webhook(webhook)) => {
                self.send_webhook(webhook, message).await;
            }
            Some(NotificationTarget::Topic(topic)) => {
                self.send_topic(topic, message).await;
            }
            None => {
                debug!("no notification target configured, dropping message");
            }
        }
    }
}
