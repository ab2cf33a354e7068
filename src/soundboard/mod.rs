use poise::serenity_prelude::{Cache, ChannelId, GuildId, UserId};

pub mod chat;
pub mod controller;
pub mod interaction;
pub mod view;

pub use controller::SoundboardController;

/// The voice channel the user currently sits in, according to the gateway cache
pub fn user_voice_channel(cache: &Cache, guild: GuildId, user: UserId) -> Option<ChannelId> {
    cache
        .guild(guild)?
        .voice_states
        .get(&user)
        .and_then(|state| state.channel_id)
}
