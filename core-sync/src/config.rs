//! Sync engine tuning knobs

use std::time::Duration;

/// Timing and sizing for the sync worker and control surface
///
/// Every wait the engine performs is configurable so tests can shrink them.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Items requested per catalog page (1-100)
    pub batch_size: u32,

    /// Pause before each page fetch
    pub fetch_delay: Duration,

    /// Pause after a batch has been drained
    pub batch_delay: Duration,

    /// How often a paused worker checks for resume or cancel
    pub pause_poll_interval: Duration,

    /// Running without activity for longer than this is reported as stalled
    pub stall_threshold: Duration,

    /// Upper bound on the persisted-progress read inside `progress()`
    pub progress_query_timeout: Duration,

    /// Saved progress older than this is discarded
    pub progress_max_age: Duration,

    /// Saved progress of an explicitly paused run is kept this long
    pub paused_progress_max_age: Duration,

    pub detail_fetch_attempts: u32,
    /// Multiplied by the attempt number between detail fetches
    pub detail_fetch_backoff: Duration,

    pub cover_download_attempts: u32,
    pub cover_download_backoff: Duration,

    /// Attempts for an album insert that lost a lock race
    pub insert_attempts: u32,
    /// Multiplied by the attempt number between insert attempts
    pub insert_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            fetch_delay: Duration::from_millis(500),
            batch_delay: Duration::from_millis(200),
            pause_poll_interval: Duration::from_millis(100),
            stall_threshold: Duration::from_secs(90),
            progress_query_timeout: Duration::from_millis(150),
            progress_max_age: Duration::from_secs(30 * 60),
            paused_progress_max_age: Duration::from_secs(4 * 60 * 60),
            detail_fetch_attempts: 3,
            detail_fetch_backoff: Duration::from_secs(1),
            cover_download_attempts: 3,
            cover_download_backoff: Duration::from_millis(500),
            insert_attempts: 3,
            insert_backoff: Duration::from_millis(500),
        }
    }
}

impl SyncConfig {
    /// Zero delays for tests
    pub fn immediate() -> Self {
        Self {
            fetch_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
            pause_poll_interval: Duration::from_millis(5),
            detail_fetch_backoff: Duration::ZERO,
            cover_download_backoff: Duration::ZERO,
            insert_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.clamp(1, 100);
        self
    }
}
