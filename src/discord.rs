use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::Discord;

/// Discord rejects embed descriptions longer than this
const MAX_DESCRIPTION: usize = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            content: None,
            embeds: Vec::new(),
        }
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct DiscordManager {
    client: Client,
}

impl DiscordManager {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Embed for one scaling narrative
    ///
    /// The colour follows the last line: failures are red, completions green,
    /// anything else light blue.
    pub fn build_narrative_embed(&self, narrative: &str) -> Embed {
        let last_line = narrative.lines().last().unwrap_or_default();

        let (title, color) = if last_line.starts_with("Failed") || last_line.contains("ERROR") {
            ("🔴 Volume Scaling Failed", 15158332) // Red
        } else if last_line.contains("completed successfully") {
            ("✅ Volume Scaled", 3066993) // Green
        } else {
            ("💾 Volume Scaling Update", 5793266) // Light blue
        };

        let mut description = narrative.to_string();
        if description.chars().count() > MAX_DESCRIPTION {
            description = description.chars().take(MAX_DESCRIPTION - 1).collect();
            description.push('…');
        }

        Embed {
            title: Some(title.to_string()),
            description: Some(description),
            color: Some(color),
            footer: Some(EmbedFooter {
                text: "volume-autoscaler".to_string(),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    #[instrument(skip(self, discord, message))]
    pub async fn send_message(&self, discord: &Discord, message: &Message) {
        match self.client.post(&discord.url).json(message).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent Discord message");
                } else {
                    error!("Discord message failed with status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("Discord API error response: {}", error_text);
                    }
                }
            }
            Err(e) => {
                error!("Failed to send Discord message: {}", e);
            }
        }
    }
}

impl Default for DiscordManager {
    fn default() -> Self {
        Self::new()
    }
}
