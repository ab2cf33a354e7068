use anyhow::{Context as _, Result, anyhow};
use poise::serenity_prelude::{
    CacheHttp as _, ComponentInteraction, Context as SerenityContext, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
};
use tracing::info;

use crate::error::UserError;
use crate::shared::BotData;
use crate::soundboard::{chat::action_rows, user_voice_channel, view::ControlAction};

pub async fn handle_interaction(
    ctx: &SerenityContext,
    interaction: &ComponentInteraction,
    data: &BotData,
    action: impl Iterator<Item = &str>,
) -> Result<()> {
    info!(
        "{} triggered component interaction: '{}'",
        interaction.user.name, interaction.data.custom_id
    );

    let action = ControlAction::parse(action).context("Invalid interaction: Unknown control")?;
    let guild = interaction
        .guild_id
        .context(UserError(anyhow!("The soundboard only works inside a server")))?;

    match action {
        ControlAction::Navigate(navigation) => {
            let board = data
                .soundboard
                .navigate(guild, interaction.message.id, navigation)
                .await?;

            interaction
                .create_response(
                    ctx.http(),
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .content(&board.header)
                            .components(action_rows(&board)),
                    ),
                )
                .await?;
        }
        ControlAction::Play(sound) => {
            let user_channel = user_voice_channel(&ctx.cache, guild, interaction.user.id);

            // connecting can take far longer than the interaction response deadline
            interaction.defer_ephemeral(ctx.http()).await?;

            let started = data
                .soundboard
                .select_sound(guild, user_channel, sound)
                .await?;

            interaction
                .create_followup(
                    ctx.http(),
                    CreateInteractionResponseFollowup::new()
                        .content(format!("🎵 Playing **{}**", started.sound))
                        .ephemeral(true),
                )
                .await?;
        }
        ControlAction::Placeholder(_) => {
            interaction
                .create_response(ctx.http(), CreateInteractionResponse::Acknowledge)
                .await?;
        }
    }

    Ok(())
}
