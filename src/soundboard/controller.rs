use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::Result;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{SoundCatalog, SoundRef};
use crate::config::HISTORY_CLEANUP_LIMIT;
use crate::error::SoundboardError;
use crate::soundboard::{
    chat::{ChatError, ChatSurface},
    view::{Navigation, RenderedBoard, SoundboardView},
};
use crate::voice::{
    VoiceConnectionManager, VoiceError,
    transport::{PlaybackHandle, PlaybackOutcome, TransportError, VoiceTransport},
};

/// The soundboard message currently tracked for a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardState {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub view: SoundboardView,
}

/// A guild without an entry is idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackSlot {
    /// Reserved by a selection that is still connecting or resolving its sound
    Reserved,
    /// `ticket` tells a finished playback apart from any later one in the same guild
    Playing { ticket: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStarted {
    pub sound: String,
}

pub struct SoundboardController<T, C> {
    catalog: SoundCatalog,
    voice: Arc<VoiceConnectionManager<T>>,
    chat: Arc<C>,
    boards: Mutex<HashMap<GuildId, BoardState>>,
    playback: Mutex<HashMap<GuildId, PlaybackSlot>>,
    // one board edit at a time per guild, so the last edit sent reflects the latest slot
    board_edits: Mutex<HashMap<GuildId, Arc<Mutex<()>>>>,
    next_ticket: AtomicU64,
}

impl<T: VoiceTransport, C: ChatSurface> SoundboardController<T, C> {
    pub fn new(catalog: SoundCatalog, voice: Arc<VoiceConnectionManager<T>>, chat: Arc<C>) -> Self {
        Self {
            catalog,
            voice,
            chat,
            boards: Mutex::new(HashMap::new()),
            playback: Mutex::new(HashMap::new()),
            board_edits: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    pub fn voice(&self) -> &VoiceConnectionManager<T> {
        &self.voice
    }

    #[cfg(test)]
    pub async fn board(&self, guild: GuildId) -> Option<BoardState> {
        self.boards.lock().await.get(&guild).copied()
    }

    pub async fn is_locked(&self, guild: GuildId) -> bool {
        self.playback.lock().await.contains_key(&guild)
    }

    /// Controls are disabled only while a sound is actually playing
    async fn controls_should_be_enabled(&self, guild: GuildId) -> bool {
        !matches!(
            self.playback.lock().await.get(&guild),
            Some(PlaybackSlot::Playing { .. })
        )
    }

    async fn board_edit_lock(&self, guild: GuildId) -> Arc<Mutex<()>> {
        Arc::clone(self.board_edits.lock().await.entry(guild).or_default())
    }

    /// Replace whatever board the guild had with a fresh one in `channel`
    pub async fn post_board(&self, guild: GuildId, channel: ChannelId) -> Result<MessageId> {
        let previous = self.boards.lock().await.remove(&guild);
        if let Some(previous) = previous {
            self.delete_quietly(previous.channel_id, previous.message_id)
                .await;
        }

        let history = match self
            .chat
            .recent_own_messages(channel, HISTORY_CLEANUP_LIMIT)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!("Skipping message cleanup in channel {channel}: {err}");
                Vec::new()
            }
        };
        let stale: Vec<_> = history
            .into_iter()
            .filter(|message| previous.is_none_or(|board| board.message_id != *message))
            .collect();
        debug!(
            "Cleaning up {} previous bot messages in channel {channel}",
            stale.len()
        );
        for message in stale {
            self.delete_quietly(channel, message).await;
        }

        let view = SoundboardView::default()
            .with_controls_enabled(self.controls_should_be_enabled(guild).await);
        let message_id = self
            .chat
            .send_board(channel, &view.render(&self.catalog))
            .await?;

        self.boards.lock().await.insert(
            guild,
            BoardState {
                channel_id: channel,
                message_id,
                view,
            },
        );
        info!("Posted soundboard {message_id} in guild {guild}");

        // playback may have started or stopped while the message was being sent
        self.sync_controls(guild).await;

        Ok(message_id)
    }

    /// Best-effort delete, a message that is already gone counts as deleted
    async fn delete_quietly(&self, channel: ChannelId, message: MessageId) {
        match self.chat.delete_message(channel, message).await {
            Ok(()) | Err(ChatError::NotFound) => {}
            Err(err) => warn!("Failed to delete message {message} in channel {channel}: {err}"),
        }
    }

    pub async fn navigate(
        &self,
        guild: GuildId,
        message: MessageId,
        navigation: Navigation,
    ) -> Result<RenderedBoard, SoundboardError> {
        let mut boards = self.boards.lock().await;
        let board = boards
            .get_mut(&guild)
            .filter(|board| board.message_id == message)
            .ok_or(SoundboardError::NoActiveBoard)?;

        board.view = board.view.navigate(navigation, &self.catalog);
        Ok(board.view.render(&self.catalog))
    }

    pub async fn remove_board(&self, guild: GuildId) -> Result<()> {
        let board = self
            .boards
            .lock()
            .await
            .remove(&guild)
            .ok_or(SoundboardError::NoActiveBoard)?;

        match self
            .chat
            .delete_message(board.channel_id, board.message_id)
            .await
        {
            Ok(()) => {}
            Err(ChatError::NotFound) => {
                debug!("Soundboard {} was already deleted", board.message_id)
            }
            Err(err) => return Err(err.into()),
        }

        info!("Removed soundboard {} in guild {guild}", board.message_id);
        Ok(())
    }

    /// Play a sound in the selecting user's voice channel.
    ///
    /// Only one selection per guild may be connecting or playing at a time. Any other selection
    /// is refused with [`SoundboardError::AlreadyPlaying`] and leaves the lock untouched.
    pub async fn select_sound(
        self: &Arc<Self>,
        guild: GuildId,
        user_channel: Option<ChannelId>,
        sound: SoundRef,
    ) -> Result<PlaybackStarted, SoundboardError> {
        let channel = user_channel.ok_or(SoundboardError::NotInVoiceChannel)?;

        {
            let mut playback = self.playback.lock().await;
            if playback.contains_key(&guild) {
                debug!("Refusing selection in guild {guild}, playback lock is held");
                return Err(SoundboardError::AlreadyPlaying);
            }
            playback.insert(guild, PlaybackSlot::Reserved);
        }

        match self.start(guild, channel, sound).await {
            Ok(started) => Ok(started),
            Err(err) => {
                self.playback.lock().await.remove(&guild);
                self.sync_controls(guild).await;
                Err(err)
            }
        }
    }

    pub async fn play_by_name(
        self: &Arc<Self>,
        guild: GuildId,
        user_channel: Option<ChannelId>,
        category: &str,
        sound: &str,
    ) -> Result<PlaybackStarted, SoundboardError> {
        let sound_ref = self
            .catalog
            .find(category, sound)
            .ok_or_else(|| SoundboardError::SoundResourceMissing(format!("{category}/{sound}")))?;

        self.select_sound(guild, user_channel, sound_ref).await
    }

    /// Runs with the guild's slot reserved
    async fn start(
        self: &Arc<Self>,
        guild: GuildId,
        channel: ChannelId,
        sound: SoundRef,
    ) -> Result<PlaybackStarted, SoundboardError> {
        let connection = self.voice.acquire_connection(guild, channel).await?;

        let entry = self.catalog.get(sound).ok_or_else(|| {
            SoundboardError::SoundResourceMissing(format!(
                "category {} sound {}",
                sound.category, sound.sound
            ))
        })?;
        if !file_exists(&entry.path).await {
            warn!("Sound file {} is missing", entry.path.display());
            return Err(SoundboardError::SoundResourceMissing(
                entry.path.display().to_string(),
            ));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.playback
            .lock()
            .await
            .insert(guild, PlaybackSlot::Playing { ticket });
        self.sync_controls(guild).await;

        let handle = match self.voice.play(&connection, &entry.path).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!("Failed to start '{}' in guild {guild}: {err}", entry.name);
                // back to a plain reservation, which the caller drops
                self.playback
                    .lock()
                    .await
                    .insert(guild, PlaybackSlot::Reserved);
                self.sync_controls(guild).await;
                return Err(SoundboardError::Voice(VoiceError::Transport(err)));
            }
        };
        info!("Playing '{}' in guild {guild}", entry.name);
        self.watch_completion(guild, ticket, handle);

        Ok(PlaybackStarted {
            sound: entry.name.clone(),
        })
    }

    fn watch_completion(self: &Arc<Self>, guild: GuildId, ticket: u64, handle: PlaybackHandle) {
        let controller = Arc::clone(self);

        tokio::spawn(async move {
            match handle.finished().await {
                PlaybackOutcome::Finished => debug!("Playback finished in guild {guild}"),
                PlaybackOutcome::Failed(reason) => {
                    warn!("Playback failed in guild {guild}: {reason}")
                }
            }
            controller.release(guild, ticket).await;
        });
    }

    /// Release the lock if it still belongs to `ticket`, then re-enable the board
    async fn release(&self, guild: GuildId, ticket: u64) {
        {
            let mut playback = self.playback.lock().await;
            if playback.get(&guild) != Some(&PlaybackSlot::Playing { ticket }) {
                debug!("Ignoring stale playback release in guild {guild}");
                return;
            }
            playback.remove(&guild);
        }

        self.sync_controls(guild).await;
    }

    /// Bring the tracked board in line with the playback slot, forgetting the board if its
    /// message has disappeared
    async fn sync_controls(&self, guild: GuildId) {
        let edit_lock = self.board_edit_lock(guild).await;
        let _guard = edit_lock.lock().await;

        let enabled = self.controls_should_be_enabled(guild).await;
        let board = {
            let mut boards = self.boards.lock().await;
            let Some(board) = boards.get_mut(&guild) else {
                return;
            };
            if board.view.controls_enabled == enabled {
                return;
            }
            board.view = board.view.with_controls_enabled(enabled);
            *board
        };

        let rendered = board.view.render(&self.catalog);
        match self
            .chat
            .edit_board(board.channel_id, board.message_id, &rendered)
            .await
        {
            Ok(()) => {}
            Err(ChatError::NotFound) => {
                debug!(
                    "Soundboard {} in guild {guild} no longer exists",
                    board.message_id
                );
                let mut boards = self.boards.lock().await;
                if boards
                    .get(&guild)
                    .is_some_and(|current| current.message_id == board.message_id)
                {
                    boards.remove(&guild);
                }
            }
            Err(err) => warn!("Failed to update soundboard in guild {guild}: {err}"),
        }
    }

    /// A running playback ends with the bot leaving voice. Connecting selections keep their
    /// reservation, their retries disconnect on purpose.
    async fn abandon_playback(&self, guild: GuildId) {
        let ticket = match self.playback.lock().await.get(&guild) {
            Some(PlaybackSlot::Playing { ticket }) => *ticket,
            _ => return,
        };
        info!("Abandoning playback in guild {guild}");
        self.release(guild, ticket).await;
    }

    pub async fn handle_voice_left(&self, guild: GuildId) {
        self.voice.handle_voice_left(guild).await;
        self.abandon_playback(guild).await;
    }

    pub async fn disconnect(&self, guild: GuildId) -> Result<bool, TransportError> {
        let left = self.voice.disconnect(guild).await?;
        self.abandon_playback(guild).await;
        Ok(left)
    }

    pub async fn force_reset(&self, guild: GuildId) -> Result<bool, TransportError> {
        let left = self.voice.force_reset(guild).await?;
        self.abandon_playback(guild).await;
        Ok(left)
    }

    /// One `(category, sounds)` line per category, sound names comma separated
    pub fn list_sounds(&self) -> Vec<(String, String)> {
        self.catalog
            .categories()
            .iter()
            .map(|category| {
                let names: Vec<_> = category.sounds.iter().map(|s| s.name.as_str()).collect();
                (
                    format!("{} ({})", category.name, category.sounds.len()),
                    names.join(", "),
                )
            })
            .collect()
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
