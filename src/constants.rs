//! Constants affecting receive, decode and mixing behaviour.

use std::time::Duration;

/// Default sample rate of the mixed output.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of channels in the mixed output.
pub const OUTPUT_CHANNELS: usize = 2;

/// Default number of stereo frames held by the shared ring buffer.
///
/// About 10.9 seconds at 48kHz. Must be a power of two.
pub const RING_BUFFER_LEN: usize = 1 << 19;

/// Largest number of samples (per channel) produced by one packet.
///
/// This is the longest Opus frame (120ms) at 48kHz.
pub const MAX_FRAME_SIZE: usize = 5760;

/// Scale factor converting signed 16-bit PCM into the `[-1, 1]` range.
pub const PCM_SCALE: f32 = 1.0 / i16::MAX as f32;

/// Default amount of buffering applied before playout.
pub const DEFAULT_PLAYOUT_DELAY: Duration = Duration::from_millis(100);

/// Maximum number of concurrently tracked sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1500;

/// Upper bound on how long an idle worker sleeps before re-checking for cancellation.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum datagram size accepted from a feed.
pub const DATAGRAM_MAX: usize = 9000;

/// The one (and only) RTP version.
pub const RTP_VERSION: u8 = 2;

/// Size of a fixed RTP header, without CSRCs or extensions.
pub const RTP_MIN_SIZE: usize = 12;

/// Payload type used for Opus traffic.
pub const OPUS_PT: u8 = 111;
/// 48kHz stereo 16-bit PCM.
pub const PCM_STEREO_PT: u8 = 10;
/// 48kHz mono 16-bit PCM.
pub const PCM_MONO_PT: u8 = 11;
/// 24kHz mono 16-bit PCM.
pub const PCM_MONO_24_PT: u8 = 116;
/// 24kHz stereo 16-bit PCM.
pub const PCM_STEREO_24_PT: u8 = 117;
/// 16kHz mono 16-bit PCM.
pub const PCM_MONO_16_PT: u8 = 119;
/// 16kHz stereo 16-bit PCM.
pub const PCM_STEREO_16_PT: u8 = 120;
/// 12kHz mono 16-bit PCM.
pub const PCM_MONO_12_PT: u8 = 122;
/// 12kHz stereo 16-bit PCM.
pub const PCM_STEREO_12_PT: u8 = 123;
/// 8kHz mono 16-bit PCM.
pub const PCM_MONO_8_PT: u8 = 125;
/// 8kHz stereo 16-bit PCM.
pub const PCM_STEREO_8_PT: u8 = 126;

/// Score added to a session's late-rate for each late packet.
pub(crate) const LATE_PENALTY: u32 = 10;

/// Late-rate at which a session stops dropping late packets and resynchronises.
pub(crate) const LATE_RESET_THRESHOLD: u32 = 20;

/// Consecutive early packets which force a session to resynchronise.
pub(crate) const EARLY_RESET_COUNT: u32 = 3;

/// Largest inter-channel delay used for stereo imaging, in seconds.
pub(crate) const MAX_PAN_DELAY_SECS: f32 = 0.0015;

/// Linear gain step equal to 1dB.
pub const ONE_DB: f32 = 1.122_018_5;
