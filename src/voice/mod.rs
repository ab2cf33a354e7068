use std::time::Duration;

use thiserror::Error;

use crate::error::whole_secs;
use crate::voice::transport::TransportError;

pub mod driver;
pub mod ledger;
pub mod manager;
pub mod transport;

pub use manager::{Connection, VoiceConnectionManager};

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error(
        "Recent voice connection issues detected. Please wait {} seconds before trying again.",
        whole_secs(.remaining)
    )]
    RecentFailureCooldown { remaining: Duration },
    #[error(
        "Discord voice servers are experiencing issues (4006 error). Please try again in {} seconds.",
        whole_secs(.retry_after)
    )]
    VoiceSessionExhausted { retry_after: Duration },
    #[error("Error connecting to the voice channel: {0}")]
    Transport(TransportError),
    #[error("The voice gateway rejected the bot, check its permissions: {0}")]
    Authorization(TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_state_the_wait() {
        let cooldown = VoiceError::RecentFailureCooldown {
            remaining: Duration::from_millis(89_400),
        };
        assert!(cooldown.to_string().contains("wait 90 seconds"));

        let exhausted = VoiceError::VoiceSessionExhausted {
            retry_after: Duration::from_secs(120),
        };
        assert!(exhausted.to_string().contains("try again in 120 seconds"));
    }
}
