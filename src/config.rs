use std::time::Duration;

use poise::serenity_prelude::UserId;

// directory scanned at startup when `SOUNDS_DIR` is not set
pub const DEFAULT_SOUNDS_DIR: &str = "./sounds";
// file extensions (lowercase, without the dot) accepted into the catalog
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

// sound buttons per soundboard page
pub const PAGE_SIZE: usize = 15;
// the controls above the page navigation are padded to a multiple of this
pub const ROW_WIDTH: usize = 3;
// how far back `/soundboard` looks for previous bot messages to clean up
pub const HISTORY_CLEANUP_LIMIT: u8 = 100;

// voice connection retry policy
pub const MAX_CONNECT_RETRIES: u32 = 3;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);
pub const EXTENDED_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// wait after tearing down a stale call before reconnecting
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);
// wait after a nominally successful connect before re-verifying it
pub const STABILIZE_DELAY: Duration = Duration::from_secs(2);
// wait after a session-invalid failure survived every alternative strategy
pub const SESSION_SETTLE_DELAY: Duration = Duration::from_secs(8);
pub const BACKOFF_BASE_SECS: u64 = 3;
pub const BACKOFF_CAP: Duration = Duration::from_secs(15);
// guilds whose retries were exhausted are refused for this long
pub const ISSUE_COOLDOWN: Duration = Duration::from_secs(120);

// part of error messages
pub const BOT_MAINTAINER: UserId = UserId::new(821735954128830504);
