use std::{fmt, path::Path, time::Duration};

use poise::serenity_prelude::{ChannelId, GuildId, async_trait};
use tokio::sync::oneshot;

// voice gateway close codes the retry policy cares about
pub const CLOSE_CODE_UNKNOWN_OPCODE: u16 = 4001;
pub const CLOSE_CODE_SESSION_INVALID: u16 = 4006;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The voice session itself is invalid or expired (4006)
    SessionInvalid,
    /// The gateway rejected the bot (4001)
    Unauthorized,
    AlreadyConnected,
    TimedOut,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub code: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn from_close_code(code: u16, message: impl Into<String>) -> Self {
        let kind = match code {
            CLOSE_CODE_SESSION_INVALID => TransportErrorKind::SessionInvalid,
            CLOSE_CODE_UNKNOWN_OPCODE => TransportErrorKind::Unauthorized,
            _ => TransportErrorKind::Other,
        };

        Self {
            kind,
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(
            TransportErrorKind::TimedOut,
            format!("Voice handshake did not finish within {}s", timeout.as_secs()),
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Resolves once the transport is done with a track, whether it ended normally or not
#[derive(Debug)]
pub struct PlaybackHandle {
    completion: oneshot::Receiver<PlaybackOutcome>,
}

impl PlaybackHandle {
    pub fn channel() -> (oneshot::Sender<PlaybackOutcome>, Self) {
        let (tx, completion) = oneshot::channel();
        (tx, Self { completion })
    }

    pub async fn finished(self) -> PlaybackOutcome {
        // a dropped sender means the track was torn down without ever reporting back
        self.completion.await.unwrap_or_else(|_| {
            PlaybackOutcome::Failed("Track was dropped before it finished".to_string())
        })
    }
}

/// The voice provider underneath the connection manager.
///
/// Implementations report failures already classified into [`TransportErrorKind`]s; all retry
/// decisions are made by the caller.
#[async_trait]
pub trait VoiceTransport: Send + Sync + 'static {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    async fn move_to(&self, guild: GuildId, channel: ChannelId) -> Result<(), TransportError>;

    async fn disconnect(&self, guild: GuildId) -> Result<(), TransportError>;

    /// Whether a call object exists at all, usable or not
    async fn has_call(&self, guild: GuildId) -> bool;

    async fn is_connected(&self, guild: GuildId) -> bool;

    async fn current_channel(&self, guild: GuildId) -> Option<ChannelId>;

    async fn endpoint(&self, guild: GuildId) -> Option<String>;

    async fn play(&self, guild: GuildId, path: &Path) -> Result<PlaybackHandle, TransportError>;

    async fn is_playing(&self, guild: GuildId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_classify() {
        assert_eq!(
            TransportError::from_close_code(4006, "session").kind,
            TransportErrorKind::SessionInvalid
        );
        assert_eq!(
            TransportError::from_close_code(4001, "opcode").kind,
            TransportErrorKind::Unauthorized
        );
        assert_eq!(
            TransportError::from_close_code(4014, "kicked").kind,
            TransportErrorKind::Other
        );
    }

    #[test]
    fn display_includes_code() {
        let error = TransportError::from_close_code(4006, "Session no longer valid");
        assert_eq!(error.to_string(), "Session no longer valid (code 4006)");
        assert_eq!(
            TransportError::timed_out(Duration::from_secs(45)).to_string(),
            "Voice handshake did not finish within 45s"
        );
    }

    #[tokio::test]
    async fn dropped_sender_reports_failure() {
        let (tx, handle) = PlaybackHandle::channel();
        drop(tx);
        assert!(matches!(handle.finished().await, PlaybackOutcome::Failed(_)));

        let (tx, handle) = PlaybackHandle::channel();
        tx.send(PlaybackOutcome::Finished).unwrap();
        assert_eq!(handle.finished().await, PlaybackOutcome::Finished);
    }
}
