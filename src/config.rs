use crate::{
    codec::{self, DecoderFactory},
    constants::*,
    error::{Error, Result},
};
use derivative::Derivative;
use std::time::Duration;

/// Configuration for a [`Monitor`] and its sessions.
///
/// [`Monitor`]: crate::Monitor
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    /// Sample rate of the mixed output, and of the audio device.
    ///
    /// Lower-rate PCM streams are upsampled by sample repetition, so this
    /// must be a whole multiple of 48kHz.
    ///
    /// Defaults to 48kHz.
    pub sample_rate: u32,

    /// Delay added between a talk spurt's arrival and its playout.
    ///
    /// A longer delay absorbs more network jitter and reordering at the
    /// cost of latency. Applies to each session on its next resync.
    ///
    /// Defaults to 100ms.
    pub playout_delay: Duration,

    /// Whether newly discovered sessions start muted.
    ///
    /// Defaults to `false`.
    pub start_muted: bool,

    /// Whether newly discovered sessions are spread across the stereo field,
    /// rather than all starting centred.
    ///
    /// Defaults to `false`.
    pub auto_position: bool,

    /// Maximum number of sessions to track at once. Streams seen once the
    /// table is full are ignored.
    ///
    /// Defaults to 1500.
    pub max_sessions: usize,

    /// Length of the shared output ring, in frames.
    ///
    /// Must be a power of two, and more than twice the largest audio
    /// callback request.
    ///
    /// Defaults to 2^19 frames (about 10.9s at 48kHz).
    pub ring_length: usize,

    /// Longest time an idle worker waits before re-checking for termination.
    ///
    /// Defaults to 100ms.
    pub worker_poll_interval: Duration,

    #[derivative(Debug = "ignore")]
    /// Source of Opus decoders for new sessions.
    ///
    /// Defaults to libopus, when the `"opus"` feature is enabled.
    pub decoder_factory: DecoderFactory,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_RAW as u32,
            playout_delay: DEFAULT_PLAYOUT_DELAY,
            start_muted: false,
            auto_position: false,
            max_sessions: DEFAULT_MAX_SESSIONS,
            ring_length: RING_BUFFER_LEN,
            worker_poll_interval: WORKER_POLL_INTERVAL,
            decoder_factory: codec::opus_factory(),
        }
    }
}

impl Config {
    /// Sets this `Config`'s output sample rate.
    #[must_use]
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Sets this `Config`'s playout delay.
    #[must_use]
    pub fn playout_delay(mut self, playout_delay: Duration) -> Self {
        self.playout_delay = playout_delay;
        self
    }

    /// Sets whether this `Config` starts new sessions muted.
    #[must_use]
    pub fn start_muted(mut self, start_muted: bool) -> Self {
        self.start_muted = start_muted;
        self
    }

    /// Sets whether this `Config` spreads new sessions across the stereo field.
    #[must_use]
    pub fn auto_position(mut self, auto_position: bool) -> Self {
        self.auto_position = auto_position;
        self
    }

    /// Sets this `Config`'s session limit.
    #[must_use]
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Sets this `Config`'s output ring length, in frames.
    #[must_use]
    pub fn ring_length(mut self, ring_length: usize) -> Self {
        self.ring_length = ring_length;
        self
    }

    /// Sets this `Config`'s idle worker wakeup interval.
    #[must_use]
    pub fn worker_poll_interval(mut self, worker_poll_interval: Duration) -> Self {
        self.worker_poll_interval = worker_poll_interval;
        self
    }

    /// Sets this `Config`'s Opus decoder source.
    #[must_use]
    pub fn decoder_factory(mut self, decoder_factory: DecoderFactory) -> Self {
        self.decoder_factory = decoder_factory;
        self
    }

    /// Checks that this `Config` describes a usable mixer.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate % SAMPLE_RATE_RAW as u32 != 0 {
            return Err(Error::InvalidConfig(
                "sample rate must be a multiple of 48kHz",
            ));
        }

        if !self.ring_length.is_power_of_two() || self.ring_length < 2 {
            return Err(Error::InvalidConfig("ring length must be a power of two"));
        }

        if self.max_sessions == 0 {
            return Err(Error::InvalidConfig("at least one session must be allowed"));
        }

        Ok(())
    }

    /// Playout delay converted to output samples.
    pub fn playout_samples(&self) -> i64 {
        playout_samples(self.playout_delay, self.sample_rate)
    }
}

/// Converts a playout delay into output samples.
pub(crate) fn playout_samples(delay: Duration, sample_rate: u32) -> i64 {
    (delay.as_secs_f64() * f64::from(sample_rate)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.playout_samples(), 4800);
    }

    #[test]
    fn bad_configs_are_rejected() {
        assert!(Config::default().sample_rate(44_100).validate().is_err());
        assert!(Config::default().ring_length(1000).validate().is_err());
        assert!(Config::default().max_sessions(0).validate().is_err());
        assert!(Config::default().sample_rate(96_000).validate().is_ok());
    }
}
