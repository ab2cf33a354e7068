//! In-memory stand-ins for the voice transport and the chat surface

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use poise::serenity_prelude::{ChannelId, GuildId, MessageId, async_trait};
use tokio::sync::oneshot;

use crate::soundboard::{
    chat::{ChatError, ChatSurface},
    view::RenderedBoard,
};
use crate::voice::transport::{
    PlaybackHandle, PlaybackOutcome, TransportError, TransportErrorKind, VoiceTransport,
};

#[derive(Debug, Clone)]
pub enum ConnectStep {
    Succeed,
    /// Reports success while leaving the call unusable
    SucceedUnverified,
    AlreadyConnected {
        live: bool,
    },
    /// Refuses the join because a live call already sits in another channel
    AlreadyConnectedTo(ChannelId),
    Fail(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect {
        channel: ChannelId,
        timeout: Duration,
    },
    Move {
        channel: ChannelId,
    },
    Disconnect,
    Play {
        path: PathBuf,
    },
}

#[derive(Debug, Default)]
struct FakeCall {
    connected: bool,
    channel: Option<ChannelId>,
    playing: bool,
}

#[derive(Debug, Default)]
struct TransportState {
    script: VecDeque<ConnectStep>,
    move_failure: Option<TransportError>,
    play_failure: Option<TransportError>,
    calls: Vec<TransportCall>,
    guilds: HashMap<GuildId, FakeCall>,
    playbacks: VecDeque<(GuildId, oneshot::Sender<PlaybackOutcome>)>,
}

/// Connect results are taken from a script in call order, succeeding once it runs dry
#[derive(Debug, Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, steps: impl IntoIterator<Item = ConnectStep>) {
        self.state.lock().unwrap().script.extend(steps);
    }

    pub fn fail_next_move(&self, error: TransportError) {
        self.state.lock().unwrap().move_failure = Some(error);
    }

    pub fn fail_next_play(&self, error: TransportError) {
        self.state.lock().unwrap().play_failure = Some(error);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn play_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Play { .. }))
            .count()
    }

    /// Report the oldest running playback as done
    pub fn finish_playback(&self, outcome: PlaybackOutcome) {
        let mut state = self.state.lock().unwrap();
        let (guild, tx) = state
            .playbacks
            .pop_front()
            .expect("no playback in progress");
        if let Some(call) = state.guilds.get_mut(&guild) {
            call.playing = false;
        }
        let _ = tx.send(outcome);
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Connect { channel, timeout });
        let step = state.script.pop_front().unwrap_or(ConnectStep::Succeed);

        // like songbird, a failed join still leaves a call object behind
        let call = state.guilds.entry(guild).or_default();
        call.channel = Some(channel);

        match step {
            ConnectStep::Succeed => {
                call.connected = true;
                Ok(())
            }
            ConnectStep::SucceedUnverified => {
                call.connected = false;
                Ok(())
            }
            ConnectStep::AlreadyConnected { live } => {
                call.connected = live;
                Err(TransportError::new(
                    TransportErrorKind::AlreadyConnected,
                    "Already connected to a voice channel",
                ))
            }
            ConnectStep::AlreadyConnectedTo(current) => {
                call.connected = true;
                call.channel = Some(current);
                Err(TransportError::new(
                    TransportErrorKind::AlreadyConnected,
                    "Already connected to a voice channel",
                ))
            }
            ConnectStep::Fail(error) => {
                call.connected = false;
                Err(error)
            }
        }
    }

    async fn move_to(&self, guild: GuildId, channel: ChannelId) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Move { channel });
        if let Some(error) = state.move_failure.take() {
            return Err(error);
        }
        state.guilds.entry(guild).or_default().channel = Some(channel);
        Ok(())
    }

    async fn disconnect(&self, guild: GuildId) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Disconnect);
        state.guilds.remove(&guild);
        Ok(())
    }

    async fn has_call(&self, guild: GuildId) -> bool {
        self.state.lock().unwrap().guilds.contains_key(&guild)
    }

    async fn is_connected(&self, guild: GuildId) -> bool {
        self.state
            .lock()
            .unwrap()
            .guilds
            .get(&guild)
            .is_some_and(|call| call.connected)
    }

    async fn current_channel(&self, guild: GuildId) -> Option<ChannelId> {
        self.state.lock().unwrap().guilds.get(&guild)?.channel
    }

    async fn endpoint(&self, guild: GuildId) -> Option<String> {
        self.is_connected(guild)
            .await
            .then(|| "fake.discord.media".to_string())
    }

    async fn play(&self, guild: GuildId, path: &Path) -> Result<PlaybackHandle, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Play {
            path: path.to_path_buf(),
        });
        if let Some(error) = state.play_failure.take() {
            return Err(error);
        }

        state.guilds.entry(guild).or_default().playing = true;
        let (tx, handle) = PlaybackHandle::channel();
        state.playbacks.push_back((guild, tx));
        Ok(handle)
    }

    async fn is_playing(&self, guild: GuildId) -> bool {
        self.state
            .lock()
            .unwrap()
            .guilds
            .get(&guild)
            .is_some_and(|call| call.playing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    Send {
        channel: ChannelId,
        message: MessageId,
    },
    Edit {
        message: MessageId,
        all_disabled: bool,
    },
    Delete {
        message: MessageId,
    },
}

#[derive(Debug, Default)]
struct ChatState {
    next_id: u64,
    history: Vec<MessageId>,
    history_unavailable: bool,
    missing: Vec<MessageId>,
    boards: HashMap<MessageId, RenderedBoard>,
    calls: Vec<ChatCall>,
}

#[derive(Debug, Default)]
pub struct FakeChat {
    state: Mutex<ChatState>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChatState {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    /// Seed bot-authored messages that are already in the channel
    pub fn seed_history(&self, ids: impl IntoIterator<Item = u64>) {
        self.state
            .lock()
            .unwrap()
            .history
            .extend(ids.into_iter().map(MessageId::new));
    }

    /// Make every history fetch fail, as with missing read permissions
    pub fn fail_history(&self) {
        self.state.lock().unwrap().history_unavailable = true;
    }

    /// Pretend someone else deleted the message
    pub fn delete_externally(&self, message: MessageId) {
        let mut state = self.state.lock().unwrap();
        state.history.retain(|id| *id != message);
        state.boards.remove(&message);
        state.missing.push(message);
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn board(&self, message: MessageId) -> Option<RenderedBoard> {
        self.state.lock().unwrap().boards.get(&message).cloned()
    }
}

#[async_trait]
impl ChatSurface for FakeChat {
    async fn recent_own_messages(
        &self,
        _channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<MessageId>, ChatError> {
        let state = self.state.lock().unwrap();
        if state.history_unavailable {
            return Err(ChatError::Discord(serenity::Error::Other(
                "Missing Access",
            )));
        }
        Ok(state.history.iter().take(limit as usize).copied().collect())
    }

    async fn send_board(
        &self,
        channel: ChannelId,
        board: &RenderedBoard,
    ) -> Result<MessageId, ChatError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let message = MessageId::new(state.next_id);
        state.history.push(message);
        state.boards.insert(message, board.clone());
        state.calls.push(ChatCall::Send { channel, message });
        Ok(message)
    }

    async fn edit_board(
        &self,
        _channel: ChannelId,
        message: MessageId,
        board: &RenderedBoard,
    ) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ChatCall::Edit {
            message,
            all_disabled: board.all_disabled(),
        });
        match state.boards.get_mut(&message) {
            Some(existing) => {
                *existing = board.clone();
                Ok(())
            }
            None => Err(ChatError::NotFound),
        }
    }

    async fn delete_message(&self, _channel: ChannelId, message: MessageId) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ChatCall::Delete { message });
        if state.missing.contains(&message) {
            return Err(ChatError::NotFound);
        }
        state.history.retain(|id| *id != message);
        state.boards.remove(&message);
        state.missing.push(message);
        Ok(())
    }
}
