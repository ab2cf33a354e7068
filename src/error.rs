use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use poise::{
    BoxFuture, CreateReply, FrameworkError,
    serenity_prelude::{
        CacheHttp as _, Colour, ComponentInteraction, Context as SerenityContext, CreateEmbed,
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, Mentionable as _,
    },
};
use thiserror::Error;
use tracing::{error, warn};

use crate::config::BOT_MAINTAINER;
use crate::voice::VoiceError;

#[derive(Error, Debug)]
#[error(transparent)]
pub struct UserError(#[from] pub anyhow::Error);

/// Every failure the soundboard reports back to the person who clicked or typed
#[derive(Error, Debug)]
pub enum SoundboardError {
    #[error("You must be in a voice channel to play sounds.")]
    NotInVoiceChannel,
    #[error("A sound is already playing, wait for it to finish.")]
    AlreadyPlaying,
    #[error("Sound file not found: `{0}`")]
    SoundResourceMissing(String),
    #[error("No soundboard is currently active in this server.")]
    NoActiveBoard,
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

impl SoundboardError {
    pub fn title(&self) -> &'static str {
        match self {
            SoundboardError::NotInVoiceChannel => "Not in a voice channel",
            SoundboardError::AlreadyPlaying => "Already playing",
            SoundboardError::SoundResourceMissing(_) => "Sound missing",
            SoundboardError::NoActiveBoard => "No active soundboard",
            SoundboardError::Voice(VoiceError::RecentFailureCooldown { .. }) => {
                "Voice connection cooling down"
            }
            SoundboardError::Voice(VoiceError::VoiceSessionExhausted { .. }) => {
                "Voice session exhausted"
            }
            SoundboardError::Voice(VoiceError::Transport(_)) => "Voice connection failed",
            SoundboardError::Voice(VoiceError::Authorization(_)) => "Voice connection unauthorized",
        }
    }

    pub fn to_embed(&self) -> CreateEmbed {
        CreateEmbed::new()
            .title(format!("❌ {}", self.title()))
            .description(self.to_string())
            .colour(Colour::ORANGE)
    }
}

/// Round up, so "wait 0 seconds" is never shown while a cooldown is still running
pub fn whole_secs(duration: &Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

pub fn deduplicate_error_chain(error: &mut Error) {
    let mut error_chain: Vec<String> = error.chain().map(|err| err.to_string()).collect();

    error_chain.dedup();

    let mut error_chain = error_chain.into_iter().rev();
    let Some(root) = error_chain.next() else {
        return;
    };
    let mut new_error = anyhow!(root);

    for message in error_chain {
        new_error = new_error.context(message);
    }

    *error = new_error;
}

fn internal_error_embed(error: &Error) -> CreateEmbed {
    CreateEmbed::new()
        .title("Internal Error")
        .description(format!(
            "```\n{error:?}\n```\nPlease report this to {}!",
            BOT_MAINTAINER.mention()
        ))
        .colour(Colour::RED)
}

fn user_error_embed(error: &Error) -> CreateEmbed {
    CreateEmbed::new()
        .title("You seem to have made a mistake")
        .description(format!("```\n{error:?}\n```"))
        .colour(Colour::ORANGE)
}

fn warning_embed(title: &str, description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(Colour::ORANGE)
}

/// Pick the embed for an error, logging it along the way
fn classify_error(mut error: Error, source: &str) -> CreateEmbed {
    if let Some(soundboard_error) = error.downcast_ref::<SoundboardError>() {
        warn!("{source} was refused: {soundboard_error}");
        soundboard_error.to_embed()
    } else if error.is::<UserError>() {
        deduplicate_error_chain(&mut error);
        warn!("User error in {source}: {error:#}");
        user_error_embed(&error)
    } else {
        deduplicate_error_chain(&mut error);
        error!("Failed to handle {source}: {error:#}");
        internal_error_embed(&error)
    }
}

pub async fn event_handler_error(
    error: Error,
    ctx: &SerenityContext,
    interaction: &ComponentInteraction,
) {
    let source = format!("component interaction '{}'", interaction.data.custom_id);
    let embed = classify_error(error, &source);

    let response_message = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .embed(embed.clone())
            .ephemeral(true),
    );

    // the interaction may already have been deferred, in which case only a followup is valid
    if interaction
        .create_response(ctx.http(), response_message)
        .await
        .is_err()
    {
        let followup_message = CreateInteractionResponseFollowup::new()
            .embed(embed)
            .ephemeral(true);

        if let Err(err) = interaction
            .create_followup(ctx.http(), followup_message)
            .await
        {
            error!("Unable to report error for {source}: {err:#}");
        }
    }
}

async fn try_handle_error<U>(error: FrameworkError<'_, U, Error>) -> Result<()>
where
    U: Send + Sync + 'static,
{
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            let invocation_string = ctx.invocation_string();
            let embed = classify_error(error, &format!("`{invocation_string}`"));

            ctx.send(
                CreateReply::default()
                    .embed(embed)
                    .reply(true)
                    .ephemeral(true),
            )
            .await?;
        }
        FrameworkError::CommandPanic { ctx, payload, .. } => {
            error!(
                "[PANIC] Invocation `{}` caused a panic with payload: {}",
                ctx.invocation_string(),
                payload.as_deref().unwrap_or("unknown"),
            );

            let embed = CreateEmbed::new()
                .title("Panicked")
                .description(format!(
                    "A critical error occurred and the command handler panicked!
This should not affect the bot as a whole.\n
Please report this to {}!",
                    BOT_MAINTAINER.mention()
                ))
                .colour(Colour::RED);

            ctx.send(
                CreateReply::default()
                    .embed(embed)
                    .reply(true)
                    .ephemeral(true),
            )
            .await?;
        }
        FrameworkError::ArgumentParse {
            error, input, ctx, ..
        } => {
            let invocation_string = ctx.invocation_string();
            let description = match input {
                Some(input) => format!(
                    "Failed to parse {input:?} from `{invocation_string}` into an argument: {error}",
                ),
                None => format!("Failed to parse an argument from `{invocation_string}`: {error}"),
            };

            warn!(description);

            ctx.send(
                CreateReply::default()
                    .embed(warning_embed("Failed to parse argument", description))
                    .reply(true)
                    .ephemeral(true),
            )
            .await?;
        }
        FrameworkError::GuildOnly { ctx, .. } => {
            warn!(
                "User attempted to invoke {:?} outside of a guild",
                ctx.invocation_string(),
            );

            ctx.send(
                CreateReply::default()
                    .embed(warning_embed(
                        "Server-only Command",
                        "You cannot use this command outside of a server.",
                    ))
                    .reply(true)
                    .ephemeral(true),
            )
            .await?;
        }
        FrameworkError::UnknownCommand {
            prefix,
            msg_content,
            ..
        } => {
            // NOTE: doesn't respond to prevent interference with foreign commands on the same bot account
            warn!("Recognized prefix {prefix:?} but did not recognize command {msg_content:?}");
        }
        other => poise::builtins::on_error(other).await?,
    }

    Ok(())
}

pub fn error_handler<U>(error: FrameworkError<'_, U, Error>) -> BoxFuture<'_, ()>
where
    U: Send + Sync + 'static,
{
    Box::pin(async move {
        if let Err(mut err) = try_handle_error(error).await {
            deduplicate_error_chain(&mut err);
            error!("Failed to handle error: {err:#}");
        }
    })
}
