use anyhow::{Context as _, Result, anyhow, bail};
use poise::{
    CreateReply,
    serenity_prelude::{Colour, CreateEmbed},
};

use crate::error::UserError;
use crate::shared::Context;

/// Post the soundboard in this channel, replacing the previous one
#[poise::command(
    slash_command,
    guild_only,
    required_bot_permissions = "VIEW_CHANNEL | SEND_MESSAGES | READ_MESSAGE_HISTORY | MANAGE_MESSAGES"
)]
pub async fn soundboard(ctx: Context<'_>) -> Result<()> {
    let guild = ctx
        .guild_id()
        .context(UserError(anyhow!("Command must be run inside a guild")))?;
    let soundboard = &ctx.data().soundboard;

    if soundboard.catalog().is_empty() {
        bail!(UserError(anyhow!(
            "No sounds are available. Add audio files to a category folder in the sounds directory."
        )));
    }

    // cleaning up the channel history can take a while
    ctx.defer_ephemeral().await?;

    soundboard.post_board(guild, ctx.channel_id()).await?;

    ctx.send(
        CreateReply::default()
            .embed(
                CreateEmbed::new()
                    .title("✅ Soundboard posted")
                    .colour(Colour::DARK_GREEN),
            )
            .ephemeral(true),
    )
    .await?;

    Ok(())
}

/// Remove this server's soundboard message
#[poise::command(slash_command, guild_only, default_member_permissions = "MANAGE_MESSAGES")]
pub async fn removesoundboard(ctx: Context<'_>) -> Result<()> {
    let guild = ctx
        .guild_id()
        .context(UserError(anyhow!("Command must be run inside a guild")))?;

    ctx.data().soundboard.remove_board(guild).await?;

    ctx.send(
        CreateReply::default()
            .embed(
                CreateEmbed::new()
                    .title("🗑️ Soundboard removed")
                    .colour(Colour::DARK_GREEN),
            )
            .ephemeral(true),
    )
    .await?;

    Ok(())
}
