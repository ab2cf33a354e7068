use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
    time::Duration,
};

use poise::serenity_prelude::{ChannelId, GuildId, async_trait};
use songbird::{
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
    error::JoinError,
    events::context_data::DisconnectReason,
    input::File as FileInput,
    model::CloseCode,
    tracks::{PlayMode, TrackHandle},
};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::config::DEFAULT_CONNECT_TIMEOUT;
use crate::voice::transport::{
    PlaybackHandle, PlaybackOutcome, TransportError, TransportErrorKind, VoiceTransport,
};

/// [`VoiceTransport`] backed by songbird's per-guild calls
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    tracks: Mutex<HashMap<GuildId, TrackHandle>>,
    // guilds whose driver has connected and not dropped since
    live_drivers: Arc<Mutex<HashSet<GuildId>>>,
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            tracks: Mutex::new(HashMap::new()),
            live_drivers: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A call keeps its connection info after the driver drops, so liveness comes from the
    /// driver's own events
    async fn watch_driver(&self, guild: GuildId, call: &Mutex<Call>) {
        self.live_drivers.lock().await.insert(guild);

        let mut call = call.lock().await;
        call.remove_all_global_events();
        for event in [
            CoreEvent::DriverConnect,
            CoreEvent::DriverReconnect,
            CoreEvent::DriverDisconnect,
        ] {
            call.add_global_event(
                Event::Core(event),
                DriverStateTracker {
                    guild,
                    live: Arc::clone(&self.live_drivers),
                },
            );
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, self.songbird.join(guild, channel)).await {
            Ok(Ok(call)) => {
                self.watch_driver(guild, &call).await;
                Ok(())
            }
            Ok(Err(err)) => Err(classify_join_error(&err)),
            Err(_elapsed) => Err(TransportError::timed_out(timeout)),
        }
    }

    async fn move_to(&self, guild: GuildId, channel: ChannelId) -> Result<(), TransportError> {
        // joining a different channel on an existing call moves it
        self.connect(guild, channel, DEFAULT_CONNECT_TIMEOUT).await
    }

    async fn disconnect(&self, guild: GuildId) -> Result<(), TransportError> {
        self.tracks.lock().await.remove(&guild);
        self.live_drivers.lock().await.remove(&guild);

        match self.songbird.remove(guild).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(err) => Err(classify_join_error(&err)),
        }
    }

    async fn has_call(&self, guild: GuildId) -> bool {
        self.songbird.get(guild).is_some()
    }

    async fn is_connected(&self, guild: GuildId) -> bool {
        let Some(call) = self.songbird.get(guild) else {
            return false;
        };
        call.lock().await.current_connection().is_some()
            && self.live_drivers.lock().await.contains(&guild)
    }

    async fn current_channel(&self, guild: GuildId) -> Option<ChannelId> {
        let call = self.songbird.get(guild)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    async fn endpoint(&self, guild: GuildId) -> Option<String> {
        let call = self.songbird.get(guild)?;
        let call = call.lock().await;
        call.current_connection().map(|info| info.endpoint.clone())
    }

    async fn play(&self, guild: GuildId, path: &Path) -> Result<PlaybackHandle, TransportError> {
        let call = self.songbird.get(guild).ok_or_else(|| {
            TransportError::new(TransportErrorKind::Other, "No voice call to play on")
        })?;

        let input = FileInput::new(path.to_path_buf());
        let track = call.lock().await.play_input(input.into());
        debug!("Started track {} in guild {guild}", path.display());

        let (tx, handle) = PlaybackHandle::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        for (event, outcome) in [
            (TrackEvent::End, PlaybackOutcome::Finished),
            (
                TrackEvent::Error,
                PlaybackOutcome::Failed(format!("Failed to play {}", path.display())),
            ),
        ] {
            let notifier = CompletionNotifier {
                outcome,
                slot: Arc::clone(&slot),
            };
            track
                .add_event(Event::Track(event), notifier)
                .map_err(|err| TransportError::new(TransportErrorKind::Other, err.to_string()))?;
        }

        self.tracks.lock().await.insert(guild, track);
        Ok(handle)
    }

    async fn is_playing(&self, guild: GuildId) -> bool {
        let Some(track) = self.tracks.lock().await.get(&guild).cloned() else {
            return false;
        };
        track
            .get_info()
            .await
            .is_ok_and(|state| matches!(state.playing, PlayMode::Play))
    }
}

/// Resolves the playback handle the first time either of its track events fires
struct CompletionNotifier {
    outcome: PlaybackOutcome,
    slot: Arc<Mutex<Option<oneshot::Sender<PlaybackOutcome>>>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if let Some(tx) = self.slot.lock().await.take() {
            if let PlaybackOutcome::Failed(reason) = &self.outcome {
                warn!("{reason}");
            }
            // receiver gone means nobody is waiting on the board anymore
            let _ = tx.send(self.outcome.clone());
        }
        Some(Event::Cancel)
    }
}

struct DriverStateTracker {
    guild: GuildId,
    live: Arc<Mutex<HashSet<GuildId>>>,
}

#[async_trait]
impl VoiceEventHandler for DriverStateTracker {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                self.set_live(true).await;
            }
            EventContext::DriverDisconnect(data) => {
                warn!(
                    "Voice driver for guild {} dropped: {:?}",
                    self.guild, data.reason
                );
                self.set_live(false).await;
            }
            _ => {}
        }
        None
    }
}

impl DriverStateTracker {
    async fn set_live(&self, live: bool) {
        let mut drivers = self.live.lock().await;
        if live {
            drivers.insert(self.guild);
        } else {
            drivers.remove(&self.guild);
        }
    }
}

fn close_code_number(code: CloseCode) -> Option<u16> {
    match code {
        CloseCode::UnknownOpcode => Some(4001),
        CloseCode::AuthenticationFailed => Some(4004),
        CloseCode::SessionInvalid => Some(4006),
        CloseCode::SessionTimeout => Some(4009),
        CloseCode::ServerNotFound => Some(4011),
        CloseCode::Disconnected => Some(4014),
        CloseCode::VoiceServerCrash => Some(4015),
        _ => None,
    }
}

fn classify_join_error(err: &JoinError) -> TransportError {
    let message = err.to_string();

    match err {
        JoinError::TimedOut => TransportError::new(TransportErrorKind::TimedOut, message),
        JoinError::Driver(connection_error) => match DisconnectReason::from(connection_error) {
            DisconnectReason::WsClosed(Some(code)) => match close_code_number(code) {
                Some(number) => TransportError::from_close_code(number, message),
                None => TransportError::new(TransportErrorKind::Other, message),
            },
            DisconnectReason::TimedOut => {
                TransportError::new(TransportErrorKind::TimedOut, message)
            }
            _ => TransportError::new(TransportErrorKind::Other, message),
        },
        _ => TransportError::new(TransportErrorKind::Other, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_driver_is_no_longer_live() {
        let live = Arc::new(Mutex::new(HashSet::new()));
        let tracker = |guild| DriverStateTracker {
            guild: GuildId::new(guild),
            live: Arc::clone(&live),
        };

        tracker(1).set_live(true).await;
        tracker(2).set_live(true).await;
        tracker(1).set_live(false).await;

        let drivers = live.lock().await;
        assert!(!drivers.contains(&GuildId::new(1)));
        assert!(drivers.contains(&GuildId::new(2)));
    }

    #[test]
    fn session_close_code_is_classified() {
        assert_eq!(close_code_number(CloseCode::SessionInvalid), Some(4006));
        assert_eq!(close_code_number(CloseCode::UnknownOpcode), Some(4001));
    }
}
