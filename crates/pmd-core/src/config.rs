//! Process manager configuration.
//!
//! Zero values are sentinels for "use the default"; read them through the accessors.
use std::time::Duration;

/// Resource limits and timing of the process manager.
#[derive(Clone, Debug)]
pub struct PmConfig {
    /// Maximum number of runners admitted through `push_cmd` (`0` = default).
    pub max_jobs: usize,
    /// Stats flush period for commands that do not set `stats_interval`.
    pub stats_interval: Duration,
    /// Resource sampling period of a running process.
    pub meter_interval: Duration,
    /// Lines kept per output stream in a job result.
    pub stream_buffer_lines: usize,
    /// Backoff before restarting a failed run.
    pub restart_delay: Duration,
    /// Period of the hook tick.
    pub hook_tick: Duration,
    /// A failed run that lasted at least this long resets the restart counter.
    pub stability_window: Duration,
}

impl PmConfig {
    pub const DEFAULT_MAX_JOBS: usize = 100;
    pub const DEFAULT_STREAM_BUFFER: usize = 1000;

    #[inline]
    pub fn max_jobs(&self) -> usize {
        if self.max_jobs == 0 {
            Self::DEFAULT_MAX_JOBS
        } else {
            self.max_jobs
        }
    }

    #[inline]
    pub fn stream_buffer_lines(&self) -> usize {
        if self.stream_buffer_lines == 0 {
            Self::DEFAULT_STREAM_BUFFER
        } else {
            self.stream_buffer_lines
        }
    }

    #[inline]
    pub fn stats_interval(&self) -> Duration {
        non_zero(self.stats_interval, Duration::from_secs(30))
    }

    #[inline]
    pub fn meter_interval(&self) -> Duration {
        non_zero(self.meter_interval, Duration::from_secs(30))
    }

    #[inline]
    pub fn hook_tick(&self) -> Duration {
        non_zero(self.hook_tick, Duration::from_secs(1))
    }
}

fn non_zero(d: Duration, fallback: Duration) -> Duration {
    if d.is_zero() { fallback } else { d }
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            max_jobs: Self::DEFAULT_MAX_JOBS,
            stats_interval: Duration::from_secs(30),
            meter_interval: Duration::from_secs(30),
            stream_buffer_lines: Self::DEFAULT_STREAM_BUFFER,
            restart_delay: Duration::from_secs(1),
            hook_tick: Duration::from_secs(1),
            stability_window: Duration::from_secs(10),
        }
    }
}
