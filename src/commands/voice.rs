use anyhow::{Context as _, Result, anyhow};
use poise::{
    CreateReply,
    serenity_prelude::{Colour, CreateEmbed, Mentionable as _},
};

use crate::error::{UserError, whole_secs};
use crate::shared::Context;

fn reply(embed: CreateEmbed) -> CreateReply {
    CreateReply::default().embed(embed).ephemeral(true)
}

/// Make the bot leave its voice channel
#[poise::command(slash_command, guild_only)]
pub async fn disconnect(ctx: Context<'_>) -> Result<()> {
    let guild = ctx
        .guild_id()
        .context(UserError(anyhow!("Command must be run inside a guild")))?;

    let embed = if ctx.data().soundboard.disconnect(guild).await? {
        CreateEmbed::new()
            .title("👋 Disconnected")
            .description("Left the voice channel.")
            .colour(Colour::DARK_GREEN)
    } else {
        CreateEmbed::new()
            .title("Not connected")
            .description("The bot is not in a voice channel.")
            .colour(Colour::ORANGE)
    };

    ctx.send(reply(embed)).await?;
    Ok(())
}

#[poise::command(
    slash_command,
    guild_only,
    subcommand_required,
    subcommands("status", "fix", "clearissues"),
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn voice(_ctx: Context<'_>) -> Result<()> {
    unreachable!("This shouldn't be possible to invoke");
}

/// Show the voice connection state for this server
#[poise::command(slash_command, guild_only)]
async fn status(ctx: Context<'_>) -> Result<()> {
    let guild = ctx
        .guild_id()
        .context(UserError(anyhow!("Command must be run inside a guild")))?;
    let status = ctx.data().soundboard.voice().status(guild).await;

    let state = status
        .session
        .as_ref()
        .map_or("Never connected".to_string(), |session| {
            format!("{:?}", session.state)
        });
    let channel = status
        .channel_id
        .map_or("None".to_string(), |channel| channel.mention().to_string());
    let yes_no = |flag: bool| if flag { "✅" } else { "❌" };

    let mut embed = CreateEmbed::new()
        .title("🔊 Voice Status")
        .field("State", state, true)
        .field("Channel", channel, true)
        .field("Connected", yes_no(status.connected), true)
        .field("Playing", yes_no(status.playing), true)
        .field(
            "Endpoint",
            status.endpoint.as_deref().unwrap_or("Unknown"),
            true,
        );

    if let Some(last_failure) = status.session.and_then(|session| session.last_failure) {
        embed = embed.field(
            "Last failure",
            format!("<t:{}:R>", last_failure.timestamp()),
            true,
        );
    }

    embed = match (status.last_issue, status.cooldown_remaining) {
        (Some(recorded_at), Some(remaining)) => embed
            .field(
                "Connection issues",
                format!(
                    "Recorded <t:{}:R>, {}s of cooldown left.\nUse `/voice fix` to clear it.",
                    recorded_at.timestamp(),
                    whole_secs(&remaining)
                ),
                false,
            )
            .colour(Colour::ORANGE),
        _ => embed.colour(Colour::DARK_GREEN),
    };

    ctx.send(reply(embed)).await?;
    Ok(())
}

/// Clear connection issues for this server and drop its voice connection
#[poise::command(slash_command, guild_only)]
async fn fix(ctx: Context<'_>) -> Result<()> {
    let guild = ctx
        .guild_id()
        .context(UserError(anyhow!("Command must be run inside a guild")))?;

    let left = ctx.data().soundboard.force_reset(guild).await?;

    let description = if left {
        "Cleared connection issues and left the voice channel. Try playing a sound again."
    } else {
        "Cleared connection issues. Try playing a sound again."
    };

    ctx.send(reply(
        CreateEmbed::new()
            .title("🔧 Voice connection reset")
            .description(description)
            .colour(Colour::DARK_GREEN),
    ))
    .await?;
    Ok(())
}

/// Clear recorded connection issues for every server
#[poise::command(slash_command, owners_only)]
async fn clearissues(ctx: Context<'_>) -> Result<()> {
    let cleared = ctx.data().soundboard.voice().clear_all_issues().await;

    ctx.send(reply(
        CreateEmbed::new()
            .title("🧹 Connection issues cleared")
            .description(format!("Cleared issue tracking for {cleared} servers."))
            .colour(Colour::DARK_GREEN),
    ))
    .await?;
    Ok(())
}
