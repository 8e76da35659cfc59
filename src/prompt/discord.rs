use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serenity::{
    builder::CreateMessage,
    collector::MessageCollector,
    http::Http,
    model::{
        channel::Message,
        id::{ChannelId, MessageId},
    },
    prelude::Context,
};
use std::{pin::Pin, sync::Arc};

use super::{InboundMessage, PromptError, PromptSurface, PromptView};
use crate::ui::embeds;

/// Flujo de mensajes entrantes de un canal
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

impl From<&Message> for InboundMessage {
    fn from(message: &Message) -> Self {
        Self {
            channel_id: message.channel_id,
            author_id: message.author.id,
            content: message.content.clone(),
        }
    }
}

/// Prompt surface backed by a Discord text channel.
pub struct ChannelSurface {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelSurface {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl PromptSurface for ChannelSurface {
    async fn show(&self, view: &PromptView) -> Result<MessageId, PromptError> {
        let message = self
            .channel_id
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::create_prompt_embed(view)),
            )
            .await?;

        Ok(message.id)
    }

    async fn dismiss(&self, message_id: MessageId) -> Result<(), PromptError> {
        self.channel_id
            .delete_message(&self.http, message_id)
            .await?;
        Ok(())
    }
}

/// Subscribes to the messages posted in `channel_id`.
///
/// Subscribe before showing the prompt; messages sent earlier are not replayed.
pub fn inbound_messages(ctx: &Context, channel_id: ChannelId) -> InboundStream {
    let stream = MessageCollector::new(&ctx.shard)
        .channel_id(channel_id)
        .stream()
        .map(|message| InboundMessage::from(&message));

    Box::pin(stream)
}
