use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId};
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, info, warn};

use crate::config::{
    BACKOFF_BASE_SECS, BACKOFF_CAP, CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
    EXTENDED_CONNECT_TIMEOUT, ISSUE_COOLDOWN, MAX_CONNECT_RETRIES, SESSION_SETTLE_DELAY,
    SETTLE_DELAY, STABILIZE_DELAY,
};
use crate::voice::{
    VoiceError,
    ledger::ConnectionIssueLedger,
    transport::{PlaybackHandle, TransportError, TransportErrorKind, VoiceTransport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub connect_timeout: Duration,
    pub extended_timeout: Duration,
    pub default_timeout: Duration,
    pub settle_delay: Duration,
    pub stabilize_delay: Duration,
    pub session_settle_delay: Duration,
    pub backoff_base_secs: u64,
    pub backoff_cap: Duration,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_CONNECT_RETRIES,
            connect_timeout: CONNECT_TIMEOUT,
            extended_timeout: EXTENDED_CONNECT_TIMEOUT,
            default_timeout: DEFAULT_CONNECT_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            stabilize_delay: STABILIZE_DELAY,
            session_settle_delay: SESSION_SETTLE_DELAY,
            backoff_base_secs: BACKOFF_BASE_SECS,
            backoff_cap: BACKOFF_CAP,
            cooldown: ISSUE_COOLDOWN,
        }
    }
}

impl RetryPolicy {
    /// `min(cap, base ^ attempt)` seconds, with `attempt` counted from 0
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base_secs.saturating_pow(attempt);
        Duration::from_secs(secs).min(self.backoff_cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Recovering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildVoiceSession {
    pub guild_id: GuildId,
    pub state: ConnectionState,
    pub channel_id: Option<ChannelId>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_endpoint: Option<String>,
}

impl GuildVoiceSession {
    fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: ConnectionState::Disconnected,
            channel_id: None,
            last_failure: None,
            last_endpoint: None,
        }
    }
}

/// Proof of a verified voice connection, required to start playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone)]
pub struct VoiceStatus {
    pub session: Option<GuildVoiceSession>,
    pub connected: bool,
    pub playing: bool,
    pub channel_id: Option<ChannelId>,
    pub endpoint: Option<String>,
    pub last_issue: Option<DateTime<Utc>>,
    pub cooldown_remaining: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Standard,
    ExtendedTimeout,
    CleanReconnect,
}

impl Strategy {
    fn timeout(self, policy: &RetryPolicy) -> Duration {
        match self {
            Strategy::Standard => policy.connect_timeout,
            Strategy::ExtendedTimeout => policy.extended_timeout,
            Strategy::CleanReconnect => policy.default_timeout,
        }
    }
}

enum AttemptFailure {
    /// Transport claimed success but the call never became usable
    Unverified,
    Transport(TransportError),
}

/// Owns every connect and disconnect issued against the voice transport, and the per-guild
/// session records that describe them.
pub struct VoiceConnectionManager<T> {
    transport: Arc<T>,
    policy: RetryPolicy,
    ledger: ConnectionIssueLedger,
    sessions: Mutex<HashMap<GuildId, GuildVoiceSession>>,
    // NOTE: nested Arc-Mutex so each guild's acquisitions are serialized without blocking
    // other guilds behind the outer lock
    guild_locks: Mutex<HashMap<GuildId, Arc<Mutex<()>>>>,
}

impl<T: VoiceTransport> VoiceConnectionManager<T> {
    pub fn new(transport: Arc<T>, policy: RetryPolicy) -> Self {
        let ledger = ConnectionIssueLedger::new(policy.cooldown);
        Self {
            transport,
            policy,
            ledger,
            sessions: Mutex::new(HashMap::new()),
            guild_locks: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &ConnectionIssueLedger {
        &self.ledger
    }

    pub async fn session(&self, guild: GuildId) -> Option<GuildVoiceSession> {
        self.sessions.lock().await.get(&guild).cloned()
    }

    async fn guild_lock(&self, guild: GuildId) -> Arc<Mutex<()>> {
        Arc::clone(self.guild_locks.lock().await.entry(guild).or_default())
    }

    async fn update_session(&self, guild: GuildId, update: impl FnOnce(&mut GuildVoiceSession)) {
        let mut sessions = self.sessions.lock().await;
        update(
            sessions
                .entry(guild)
                .or_insert_with(|| GuildVoiceSession::new(guild)),
        );
    }

    async fn set_state(&self, guild: GuildId, state: ConnectionState) {
        self.update_session(guild, |session| session.state = state)
            .await;
    }

    /// Produce a verified connection to `channel`, retrying transient failures.
    ///
    /// Fails without touching the transport while the guild is cooling down from an earlier
    /// exhausted attempt.
    pub async fn acquire_connection(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Connection, VoiceError> {
        let guild_lock = self.guild_lock(guild).await;
        let _guard = guild_lock.lock().await;

        if let Some(remaining) = self.ledger.remaining(guild).await {
            warn!(
                "Refusing voice connection for guild {guild}, {}s of cooldown remaining",
                remaining.as_secs()
            );
            return Err(VoiceError::RecentFailureCooldown { remaining });
        }

        if let Some(connection) = self.reuse_existing(guild, channel).await {
            self.mark_connected(connection).await;
            return Ok(connection);
        }

        self.set_state(guild, ConnectionState::Connecting).await;

        match self.connect_with_retries(guild, channel).await {
            Ok(connection) => {
                self.mark_connected(connection).await;
                Ok(connection)
            }
            Err(err) => {
                warn!("Voice connection for guild {guild} failed: {err}");
                self.update_session(guild, |session| {
                    session.state = ConnectionState::Disconnected;
                    session.channel_id = None;
                    session.last_failure = Some(Utc::now());
                })
                .await;
                Err(err)
            }
        }
    }

    async fn mark_connected(&self, connection: Connection) {
        let endpoint = self.transport.endpoint(connection.guild_id).await;
        self.update_session(connection.guild_id, |session| {
            session.state = ConnectionState::Connected;
            session.channel_id = Some(connection.channel_id);
            if endpoint.is_some() {
                session.last_endpoint = endpoint;
            }
        })
        .await;
    }

    /// Same channel and still live: hand it back. Different channel: try moving the call.
    async fn reuse_existing(&self, guild: GuildId, channel: ChannelId) -> Option<Connection> {
        let current = self.transport.current_channel(guild).await?;
        let connection = Connection {
            guild_id: guild,
            channel_id: channel,
        };

        if current == channel {
            if self.transport.is_connected(guild).await {
                debug!("Reusing live voice connection in guild {guild}");
                return Some(connection);
            }
            debug!("Existing call in guild {guild} is not connected, reconnecting");
            return None;
        }

        info!("Moving voice connection in guild {guild} from {current} to {channel}");
        match self.transport.move_to(guild, channel).await {
            Ok(()) if self.verify(guild).await => Some(connection),
            Ok(()) => {
                warn!("Moved voice connection in guild {guild} did not stabilise");
                None
            }
            Err(err) => {
                warn!("Failed to move voice connection in guild {guild}: {err}");
                None
            }
        }
    }

    async fn connect_with_retries(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Connection, VoiceError> {
        let max_retries = self.policy.max_retries.max(1);

        for attempt in 0..max_retries {
            let is_last = attempt + 1 == max_retries;
            info!(
                "Voice connection attempt {}/{max_retries} for guild {guild}",
                attempt + 1
            );

            // stale sessions must never be reused
            if self.transport.has_call(guild).await {
                self.force_disconnect(guild, self.policy.settle_delay).await;
            }

            let error = match self.attempt(guild, channel, Strategy::Standard).await {
                Ok(connection) => {
                    info!("Voice connection for guild {guild} established");
                    return Ok(connection);
                }
                Err(AttemptFailure::Unverified) => {
                    warn!(
                        "Attempt {} for guild {guild} reported success but is not connected",
                        attempt + 1
                    );
                    if !is_last {
                        sleep(self.policy.backoff(attempt)).await;
                    }
                    continue;
                }
                Err(AttemptFailure::Transport(error)) => error,
            };

            match error.kind {
                TransportErrorKind::SessionInvalid => {
                    warn!("Attempt {} for guild {guild} hit an invalid session: {error}", attempt + 1);
                    self.set_state(guild, ConnectionState::Recovering).await;

                    if let Some(connection) = self.try_alternatives(guild, channel).await {
                        return Ok(connection);
                    }

                    self.force_disconnect(guild, self.policy.session_settle_delay)
                        .await;

                    if is_last {
                        self.ledger.record(guild).await;
                        return Err(VoiceError::VoiceSessionExhausted {
                            retry_after: self.policy.cooldown,
                        });
                    }

                    let wait = self.policy.backoff(attempt);
                    info!("Waiting {}s before retrying guild {guild}", wait.as_secs());
                    sleep(wait).await;
                }
                TransportErrorKind::Unauthorized => {
                    return Err(VoiceError::Authorization(error));
                }
                TransportErrorKind::AlreadyConnected => {
                    let current = self.transport.current_channel(guild).await;
                    if current == Some(channel) && self.verify(guild).await {
                        debug!("Transport reports guild {guild} already connected, reusing it");
                        return Ok(Connection {
                            guild_id: guild,
                            channel_id: channel,
                        });
                    }
                    warn!(
                        "Guild {guild} is already connected but not usable in {channel} (current: {current:?})"
                    );
                    return Err(VoiceError::Transport(error));
                }
                TransportErrorKind::TimedOut | TransportErrorKind::Other => {
                    warn!("Attempt {} for guild {guild} failed: {error}", attempt + 1);
                    if is_last {
                        return Err(VoiceError::Transport(error));
                    }
                    sleep(self.policy.backoff(attempt)).await;
                }
            }
        }

        // only reachable when every attempt connected without ever becoming usable
        self.ledger.record(guild).await;
        Err(VoiceError::Transport(TransportError::new(
            TransportErrorKind::Other,
            format!("Voice connection never stabilised after {max_retries} attempts"),
        )))
    }

    async fn try_alternatives(&self, guild: GuildId, channel: ChannelId) -> Option<Connection> {
        for strategy in [Strategy::ExtendedTimeout, Strategy::CleanReconnect] {
            info!("Trying alternative voice connection strategy {strategy:?} for guild {guild}");

            if strategy == Strategy::CleanReconnect && self.transport.has_call(guild).await {
                self.force_disconnect(guild, self.policy.settle_delay).await;
            }

            match self.attempt(guild, channel, strategy).await {
                Ok(connection) => {
                    info!("Alternative strategy {strategy:?} succeeded for guild {guild}");
                    return Some(connection);
                }
                Err(AttemptFailure::Unverified) => {
                    warn!("Alternative strategy {strategy:?} for guild {guild} did not stabilise")
                }
                Err(AttemptFailure::Transport(err)) => {
                    warn!("Alternative strategy {strategy:?} for guild {guild} failed: {err}")
                }
            }
        }
        None
    }

    async fn attempt(
        &self,
        guild: GuildId,
        channel: ChannelId,
        strategy: Strategy,
    ) -> Result<Connection, AttemptFailure> {
        self.transport
            .connect(guild, channel, strategy.timeout(&self.policy))
            .await
            .map_err(AttemptFailure::Transport)?;

        if self.verify(guild).await {
            Ok(Connection {
                guild_id: guild,
                channel_id: channel,
            })
        } else {
            Err(AttemptFailure::Unverified)
        }
    }

    /// Transports may report success before the session is usable
    async fn verify(&self, guild: GuildId) -> bool {
        sleep(self.policy.stabilize_delay).await;
        self.transport.is_connected(guild).await
    }

    async fn force_disconnect(&self, guild: GuildId, wait: Duration) {
        match self.transport.disconnect(guild).await {
            Ok(()) => debug!("Force disconnected voice in guild {guild}"),
            Err(err) => warn!("Error during forced voice disconnect in guild {guild}: {err}"),
        }
        sleep(wait).await;
    }

    pub async fn play(
        &self,
        connection: &Connection,
        path: &Path,
    ) -> Result<PlaybackHandle, TransportError> {
        self.transport.play(connection.guild_id, path).await
    }

    /// Leave voice in the guild. Returns `false` when there was nothing to leave.
    pub async fn disconnect(&self, guild: GuildId) -> Result<bool, TransportError> {
        let guild_lock = self.guild_lock(guild).await;
        let _guard = guild_lock.lock().await;

        let had_call = self.transport.has_call(guild).await;
        if had_call {
            self.transport.disconnect(guild).await?;
            info!("Disconnected from voice in guild {guild}");
        }

        self.reset_session(guild).await;
        Ok(had_call)
    }

    /// Forget the guild's recorded failures and drop whatever call it has
    pub async fn force_reset(&self, guild: GuildId) -> Result<bool, TransportError> {
        if self.ledger.clear(guild).await {
            info!("Cleared voice connection issue tracking for guild {guild}");
        }
        self.disconnect(guild).await
    }

    pub async fn clear_all_issues(&self) -> usize {
        let cleared = self.ledger.clear_all().await;
        info!("Cleared voice connection issue tracking for {cleared} guilds");
        cleared
    }

    /// The gateway reported that the bot is no longer in a voice channel
    pub async fn handle_voice_left(&self, guild: GuildId) {
        let mut sessions = self.sessions.lock().await;
        // retries disconnect on purpose, those events belong to the running acquisition
        if let Some(session) = sessions.get_mut(&guild)
            && session.state == ConnectionState::Connected
        {
            info!("Bot left voice in guild {guild}, resetting session");
            session.state = ConnectionState::Disconnected;
            session.channel_id = None;
        }
    }

    async fn reset_session(&self, guild: GuildId) {
        self.update_session(guild, |session| {
            session.state = ConnectionState::Disconnected;
            session.channel_id = None;
        })
        .await;
    }

    pub async fn status(&self, guild: GuildId) -> VoiceStatus {
        let issue = self.ledger.get(guild).await;
        VoiceStatus {
            session: self.session(guild).await,
            connected: self.transport.is_connected(guild).await,
            playing: self.transport.is_playing(guild).await,
            channel_id: self.transport.current_channel(guild).await,
            endpoint: self.transport.endpoint(guild).await,
            last_issue: issue.map(|record| record.recorded_at),
            cooldown_remaining: issue
                .map(|record| self.ledger.window().saturating_sub(record.at.elapsed())),
        }
    }
}
