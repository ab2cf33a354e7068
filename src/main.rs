use std::{collections::HashSet, env, path::PathBuf, sync::Arc};

use anyhow::{Result, anyhow};
use poise::{
    Framework, FrameworkContext, FrameworkOptions, PrefixFrameworkOptions,
    serenity_prelude::{
        ClientBuilder, Context as SerenityContext, FullEvent, GatewayIntents, Interaction,
    },
};
use songbird::{SerenityInit as _, Songbird};
use tracing::{info, warn};

use catalog::SoundCatalog;
use shared::BotData;
use soundboard::{SoundboardController, chat::DiscordChat};
use voice::{VoiceConnectionManager, driver::SongbirdTransport, manager::RetryPolicy};

use crate::config::{BOT_MAINTAINER, DEFAULT_SOUNDS_DIR, EXTENDED_CONNECT_TIMEOUT};

mod catalog;
mod commands;
mod config;
mod error;
mod log;
mod shared;
mod soundboard;
#[cfg(test)]
mod testing;
mod voice;

fn get_env_var(name: &str) -> Result<String> {
    env::var(name).map_err(|err| anyhow!("Failed to load environment variable '{name}': {err:#}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = log::init_log();

    _ = dotenvy::dotenv();

    let token = get_env_var("DISCORD_TOKEN")?;
    let sounds_dir = get_env_var("SOUNDS_DIR").map_or_else(
        |_| {
            info!("No sound directory provided, using '{DEFAULT_SOUNDS_DIR}'");
            PathBuf::from(DEFAULT_SOUNDS_DIR)
        },
        PathBuf::from,
    );

    let catalog = SoundCatalog::scan(&sounds_dir)?;
    if catalog.is_empty() {
        warn!(
            "No sounds found in {}, the soundboard will be empty",
            sounds_dir.display()
        );
    }

    // the retry policy enforces its own per-attempt timeouts, so songbird must not give up first
    let songbird = Songbird::serenity_from_config(
        songbird::Config::default()
            .gateway_timeout(Some(EXTENDED_CONNECT_TIMEOUT))
            .driver_timeout(Some(EXTENDED_CONNECT_TIMEOUT)),
    );

    let commands = vec![
        commands::soundboard::soundboard(),
        commands::soundboard::removesoundboard(),
        commands::play::play(),
        commands::play::sounds(),
        commands::voice::disconnect(),
        commands::voice::voice(),
        commands::register::register(),
        commands::register::unregister(),
    ];

    // `GUILD_VOICE_STATES`: voice connections, and finding the clicking user's channel
    // `GUILD_MESSAGES`: cleaning up previous soundboard messages
    // `MESSAGE_CONTENT`: only for the `register` prefix command
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let prefix_options = PrefixFrameworkOptions {
        mention_as_prefix: true,
        ..Default::default()
    };

    let transport_songbird = Arc::clone(&songbird);
    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands,
            prefix_options,
            owners: HashSet::from([BOT_MAINTAINER]),
            on_error: error::error_handler,
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "[>] `{}` invoked by {}",
                        ctx.invocation_string(),
                        ctx.author().name,
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "[<] {}'s `{}` invocation completed successfully",
                        ctx.author().name,
                        ctx.invocation_string(),
                    );
                })
            },
            ..Default::default()
        })
        .initialize_owners(true)
        .setup(move |ctx, ready, _framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);

                let transport = Arc::new(SongbirdTransport::new(transport_songbird));
                let voice = Arc::new(VoiceConnectionManager::new(
                    transport,
                    RetryPolicy::default(),
                ));
                let chat = Arc::new(DiscordChat::new(Arc::clone(&ctx.http), ready.user.id));

                Ok(BotData {
                    soundboard: Arc::new(SoundboardController::new(catalog, voice, chat)),
                })
            })
        })
        .build();

    let mut client = ClientBuilder::new(token, intents)
        .framework(framework)
        .register_songbird_with(songbird)
        .await?;

    client.start().await?;

    Ok(())
}

async fn event_handler(
    ctx: &SerenityContext,
    event: &FullEvent,
    framework: FrameworkContext<'_, BotData, anyhow::Error>,
    data: &BotData,
) -> Result<()> {
    match event {
        FullEvent::InteractionCreate {
            interaction: Interaction::Component(interaction),
        } => {
            let mut action = interaction.data.custom_id.split(':');

            if action.next().unwrap_or_default() == soundboard::view::ID_PREFIX
                && let Err(err) =
                    soundboard::interaction::handle_interaction(ctx, interaction, data, action)
                        .await
            {
                error::event_handler_error(err, ctx, interaction).await;
            }
        }
        FullEvent::VoiceStateUpdate { new, .. } => {
            if new.user_id == framework.bot_id
                && new.channel_id.is_none()
                && let Some(guild) = new.guild_id
            {
                data.soundboard.handle_voice_left(guild).await;
            }
        }
        _ => {}
    }

    Ok(())
}
