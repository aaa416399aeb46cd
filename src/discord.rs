use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{ChannelId, CreateEmbed, CreateMessage, GuildId};
use serenity::http::Http;
use tracing::{debug, error, info};

use crate::notify::{Audience, Destination, NotificationSink};

/// League gold.
const EMBED_COLOUR: u32 = 0x785A28;

const MEMBER_PAGE: u64 = 1000;

pub struct DiscordSink {
    http: Arc<Http>,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send(&self, destination: u64, text: &str) {
        let message = CreateMessage::new()
            .embed(CreateEmbed::new().description(text).colour(EMBED_COLOUR));
        match self
            .http
            .send_message(ChannelId::new(destination), vec![], &message)
            .await
        {
            Ok(message) => info!("League update sent: {}", message.id),
            Err(e) => error!("Error sending league update to {}: {}", destination, e),
        }
    }
}

/// Each configured guild paired with the channel its updates go to.
pub struct GuildAudience {
    http: Arc<Http>,
    channels: Vec<(GuildId, ChannelId)>,
}

impl GuildAudience {
    pub fn new(http: Arc<Http>, channels: Vec<(u64, u64)>) -> Self {
        Self {
            http,
            channels: channels
                .into_iter()
                .map(|(guild, channel)| (GuildId::new(guild), ChannelId::new(channel)))
                .collect(),
        }
    }

    async fn members(&self, guild: GuildId) -> serenity::Result<HashMap<u64, String>> {
        let mut members = HashMap::new();
        let mut after = None;
        loop {
            let page = self
                .http
                .get_guild_members(guild, Some(MEMBER_PAGE), after)
                .await?;
            let full_page = page.len() as u64 == MEMBER_PAGE;
            after = page.last().map(|member| member.user.id.get());
            for member in page {
                members.insert(member.user.id.get(), member.display_name().to_string());
            }
            if !full_page {
                return Ok(members);
            }
        }
    }
}

#[async_trait]
impl Audience for GuildAudience {
    async fn destinations(&self) -> Vec<Destination> {
        let mut destinations = Vec::new();
        for (guild, channel) in &self.channels {
            match self.members(*guild).await {
                Ok(members) => {
                    debug!("Guild {} has {} members", guild, members.len());
                    destinations.push(Destination {
                        channel_id: channel.get(),
                        members,
                    });
                }
                Err(e) => error!("Unable to list the members of guild {}: {}", guild, e),
            }
        }
        destinations
    }
}
