use anyhow::{Context as _, Result, anyhow};
use poise::{
    CreateReply,
    serenity_prelude::{Colour, CreateEmbed, CreateEmbedFooter},
};

use crate::error::UserError;
use crate::shared::Context;
use crate::soundboard::user_voice_channel;

// Discord limits for autocomplete choices and embed fields
const MAX_CHOICES: usize = 25;
const MAX_FIELDS: usize = 25;
const MAX_FIELD_CHARS: usize = 1024;

/// Play a sound by name in your voice channel
#[poise::command(slash_command, guild_only)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Sound category"]
    #[autocomplete = "autocomplete_category"]
    category: String,
    #[description = "Sound name"]
    #[autocomplete = "autocomplete_sound"]
    sound: String,
) -> Result<()> {
    let guild = ctx
        .guild_id()
        .context(UserError(anyhow!("Command must be run inside a guild")))?;
    let user_channel = user_voice_channel(ctx.cache(), guild, ctx.author().id);

    ctx.defer_ephemeral().await?;

    let started = ctx
        .data()
        .soundboard
        .play_by_name(guild, user_channel, &category, &sound)
        .await?;

    ctx.send(
        CreateReply::default()
            .content(format!("🎵 Playing **{}**", started.sound))
            .ephemeral(true),
    )
    .await?;

    Ok(())
}

async fn autocomplete_category<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let partial = partial.to_lowercase();

    ctx.data()
        .soundboard
        .catalog()
        .categories()
        .iter()
        .map(|category| category.name.clone())
        .filter(|name| name.to_lowercase().starts_with(&partial))
        .take(MAX_CHOICES)
        .collect::<Vec<_>>()
        .into_iter()
}

// NOTE: the chosen category isn't visible here, so names from every category are offered
async fn autocomplete_sound<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let partial = partial.to_lowercase();

    let mut names: Vec<_> = ctx
        .data()
        .soundboard
        .catalog()
        .categories()
        .iter()
        .flat_map(|category| &category.sounds)
        .map(|sound| sound.name.clone())
        .filter(|name| name.to_lowercase().contains(&partial))
        .collect();
    names.sort();
    names.dedup();
    names.truncate(MAX_CHOICES);

    names.into_iter()
}

/// List every available sound
#[poise::command(slash_command)]
pub async fn sounds(ctx: Context<'_>) -> Result<()> {
    let listing = ctx.data().soundboard.list_sounds();

    let mut embed = CreateEmbed::new()
        .title("🎵 Available Sounds")
        .colour(Colour::BLURPLE);

    if listing.is_empty() {
        embed = embed.description("No sounds are available.");
    }

    if listing.len() > MAX_FIELDS {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Showing {MAX_FIELDS} of {} categories",
            listing.len()
        )));
    }

    for (category, names) in listing.into_iter().take(MAX_FIELDS) {
        embed = embed.field(category, truncate_field(&names), false);
    }

    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;

    Ok(())
}

fn truncate_field(value: &str) -> String {
    if value.chars().count() <= MAX_FIELD_CHARS {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(MAX_FIELD_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_fit_discord_limit() {
        let short = "airhorn, bruh";
        assert_eq!(truncate_field(short), short);

        let long = "sound, ".repeat(300);
        let truncated = truncate_field(&long);
        assert_eq!(truncated.chars().count(), MAX_FIELD_CHARS);
        assert!(truncated.ends_with('…'));
    }
}
