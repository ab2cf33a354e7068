use std::sync::Arc;

use poise::serenity_prelude::{
    ButtonStyle, ChannelId, CreateActionRow, CreateButton, CreateMessage, EditMessage,
    GetMessages, Http, HttpError, MessageId, UserId, async_trait,
};
use thiserror::Error;

use crate::soundboard::view::{Control, ControlStyle, RenderedBoard};

// Discord's "Unknown Message" JSON error code
const UNKNOWN_MESSAGE: isize = 10008;
const MAX_BUTTONS_PER_ROW: usize = 5;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("The message no longer exists")]
    NotFound,
    #[error(transparent)]
    Discord(serenity::Error),
}

impl From<serenity::Error> for ChatError {
    fn from(err: serenity::Error) -> Self {
        if let serenity::Error::Http(http_err) = &err {
            let http_err: &HttpError = http_err;
            if let HttpError::UnsuccessfulRequest(response) = http_err
                && response.error.code == UNKNOWN_MESSAGE
            {
                return ChatError::NotFound;
            }
        }
        ChatError::Discord(err)
    }
}

/// The few message operations the soundboard needs from the chat platform
#[async_trait]
pub trait ChatSurface: Send + Sync + 'static {
    /// Newest first, only messages authored by the bot itself
    async fn recent_own_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<MessageId>, ChatError>;

    async fn send_board(
        &self,
        channel: ChannelId,
        board: &RenderedBoard,
    ) -> Result<MessageId, ChatError>;

    async fn edit_board(
        &self,
        channel: ChannelId,
        message: MessageId,
        board: &RenderedBoard,
    ) -> Result<(), ChatError>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId)
    -> Result<(), ChatError>;
}

pub struct DiscordChat {
    http: Arc<Http>,
    bot_id: UserId,
}

impl DiscordChat {
    pub fn new(http: Arc<Http>, bot_id: UserId) -> Self {
        Self { http, bot_id }
    }
}

#[async_trait]
impl ChatSurface for DiscordChat {
    async fn recent_own_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<MessageId>, ChatError> {
        let messages = channel
            .messages(&*self.http, GetMessages::new().limit(limit))
            .await?;

        Ok(messages
            .into_iter()
            .filter(|message| message.author.id == self.bot_id)
            .map(|message| message.id)
            .collect())
    }

    async fn send_board(
        &self,
        channel: ChannelId,
        board: &RenderedBoard,
    ) -> Result<MessageId, ChatError> {
        let message = channel
            .send_message(
                &*self.http,
                CreateMessage::new()
                    .content(&board.header)
                    .components(action_rows(board)),
            )
            .await?;
        Ok(message.id)
    }

    async fn edit_board(
        &self,
        channel: ChannelId,
        message: MessageId,
        board: &RenderedBoard,
    ) -> Result<(), ChatError> {
        channel
            .edit_message(
                &*self.http,
                message,
                EditMessage::new()
                    .content(&board.header)
                    .components(action_rows(board)),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), ChatError> {
        channel.delete_message(&*self.http, message).await?;
        Ok(())
    }
}

fn button(control: &Control) -> CreateButton {
    let style = match control.style {
        ControlStyle::Secondary => ButtonStyle::Secondary,
        ControlStyle::Success => ButtonStyle::Success,
        ControlStyle::Danger => ButtonStyle::Danger,
    };

    CreateButton::new(control.action.custom_id())
        .label(&control.label)
        .style(style)
        .disabled(control.disabled)
}

/// Discord allows at most five buttons per action row
pub fn action_rows(board: &RenderedBoard) -> Vec<CreateActionRow> {
    board
        .controls
        .chunks(MAX_BUTTONS_PER_ROW)
        .map(|row| CreateActionRow::Buttons(row.iter().map(button).collect()))
        .collect()
}
