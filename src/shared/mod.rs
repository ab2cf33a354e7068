use std::sync::Arc;

use anyhow::Error;

use crate::soundboard::{SoundboardController, chat::DiscordChat};
use crate::voice::driver::SongbirdTransport;

pub type Soundboard = SoundboardController<SongbirdTransport, DiscordChat>;

pub struct BotData {
    // NOTE: Arc so playback completion tasks can outlive the interaction that started them
    pub soundboard: Arc<Soundboard>,
}

pub type Context<'a> = poise::Context<'a, BotData, Error>;
