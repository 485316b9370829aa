//! Per-stream session records, their packet queues, and the table holding them.

mod queue;
mod table;

pub use self::{queue::*, table::*};

use crate::{
    codec::{Bandwidth, PayloadKind},
    mix,
    ring::SamplePos,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::{fmt, net::SocketAddr, sync::Arc, thread::JoinHandle};
use tracing::warn;

/// Identifies one media stream: the sending socket plus its RTP SSRC.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct SessionKey {
    pub sender: SocketAddr,
    pub ssrc: u32,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ssrc, self.sender)
    }
}

/// Operator-adjustable mixing controls.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Controls {
    /// Linear gain; `1.0` is 0dB.
    pub gain: f32,
    /// Stereo position: -1 is hard left, 0 centre, +1 hard right.
    pub pan: f32,
    pub muted: bool,
    /// Resynchronise playout timing on the next packet.
    pub reset: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            muted: false,
            reset: false,
        }
    }
}

/// Running counters for a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionStats {
    /// RTP packets handed to the worker.
    pub packets: u64,
    /// Packets which carried no audio.
    pub empties: u64,
    /// Sequence gaps, excluding those at the start of a talk spurt.
    pub drops: u64,
    /// Packets which arrived after their playout time.
    pub lates: u64,
    /// Packets scheduled implausibly far in the future.
    pub earlies: u64,
    /// Playout timing resynchronisations.
    pub resets: u64,
    /// Seconds of audio received over the session's lifetime.
    pub total_active: f64,
    /// Seconds of audio received in the current talk spurt.
    pub current_active: f64,
}

/// Decoder and timing state last reported by a session's worker.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamStatus {
    pub payload: Option<PayloadKind>,
    pub sample_rate: u32,
    pub channels: usize,
    pub bandwidth: Option<Bandwidth>,
    /// Samples per channel in the last decoded packet.
    pub frame_size: usize,
    /// Output position the last packet was mixed at.
    pub last_target: SamplePos,
    /// Output position just after the last packet's audio.
    pub write_cursor: SamplePos,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) controls: Controls,
    pub(crate) stats: SessionStats,
    pub(crate) status: StreamStatus,
}

/// One received media stream.
///
/// Identity is fixed at creation. Controls may be changed by any thread;
/// statistics and stream status are published by the session's worker
/// after each packet.
pub struct Session {
    key: SessionKey,
    feed: Arc<str>,
    label: Option<String>,
    pub(crate) queue: PacketQueue,
    state: Mutex<SessionState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("feed", &self.feed)
            .field("label", &self.label)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        key: SessionKey,
        feed: Arc<str>,
        label: Option<String>,
        controls: Controls,
    ) -> Self {
        Self {
            key,
            feed,
            label,
            queue: PacketQueue::new(),
            state: Mutex::new(SessionState {
                controls,
                ..Default::default()
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn ssrc(&self) -> u32 {
        self.key.ssrc
    }

    pub fn sender(&self) -> SocketAddr {
        self.key.sender
    }

    /// Name of the feed this session was first heard on.
    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn controls(&self) -> Controls {
        self.state.lock().controls
    }

    pub fn stats(&self) -> SessionStats {
        self.state.lock().stats.clone()
    }

    pub fn status(&self) -> StreamStatus {
        self.state.lock().status.clone()
    }

    pub fn set_gain(&self, gain: f32) {
        self.state.lock().controls.gain = gain.max(0.0);
    }

    /// Scales the gain by `db` decibels.
    pub fn adjust_gain_db(&self, db: f32) {
        self.state.lock().controls.gain *= mix::db_to_gain(db);
    }

    /// Sets the stereo position, clamped to `[-1, 1]`.
    pub fn set_pan(&self, pan: f32) {
        self.state.lock().controls.pan = pan.max(-1.0).min(1.0);
    }

    /// Moves the stereo position by `delta`, clamped to `[-1, 1]`.
    pub fn nudge_pan(&self, delta: f32) {
        let mut state = self.state.lock();
        state.controls.pan = (state.controls.pan + delta).max(-1.0).min(1.0);
    }

    pub fn mute(&self) {
        self.state.lock().controls.muted = true;
    }

    /// Unmutes the session, resynchronising it if it had been muted.
    ///
    /// The timing of a muted stream can drift unnoticed, so playback restarts
    /// from a fresh playout delay.
    pub fn unmute(&self) {
        let mut state = self.state.lock();
        if state.controls.muted {
            state.controls.muted = false;
            state.controls.reset = true;
        }
    }

    /// Requests a playout timing resync on the next packet.
    pub fn request_reset(&self) {
        self.state.lock().controls.reset = true;
    }

    /// Asks the session's worker to exit.
    ///
    /// The worker notices at once if idle, or after its current packet.
    /// Packets arriving afterwards are discarded, and the stream's next
    /// packet starts a fresh session in this one's place.
    pub fn terminate(&self) {
        self.queue.cancel();
    }

    pub fn is_terminating(&self) -> bool {
        self.queue.is_cancelled()
    }

    /// Waits for the worker to exit. Call [`terminate`] first.
    ///
    /// The handle stays locked until the worker has exited, so concurrent
    /// callers all return after it is gone.
    ///
    /// [`terminate`]: Session::terminate
    pub(crate) fn join(&self) {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                warn!("Worker for session {} panicked.", self.key);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn has_worker(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Point-in-time view of this session, relative to the output's read
    /// cursor.
    pub fn snapshot(&self, read_cursor: SamplePos, sample_rate: u32) -> SessionSnapshot {
        let state = self.state.lock();
        let rate = i64::from(sample_rate.max(1));
        let write = state.status.write_cursor;
        let status = &state.status;

        SessionSnapshot {
            key: self.key,
            feed: self.feed.to_string(),
            label: self.label.clone(),
            controls: state.controls,
            gain_db: if state.controls.muted {
                f32::NEG_INFINITY
            } else {
                mix::gain_to_db(state.controls.gain)
            },
            stats: state.stats.clone(),
            payload: status.payload,
            channels: status.channels,
            bandwidth_khz: status.bandwidth.map(Bandwidth::khz),
            frame_ms: if status.sample_rate == 0 {
                0
            } else {
                1000 * status.frame_size as u64 / u64::from(status.sample_rate)
            },
            queue_ms: (1000 * (write - read_cursor) / rate).max(0),
            idle_secs: if write < read_cursor {
                (read_cursor - write) / rate
            } else {
                0
            },
            write_cursor: write,
        }
    }
}

/// A copy of one session's state, for display or export.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub feed: String,
    pub label: Option<String>,
    pub controls: Controls,
    /// Gain in dB, or negative infinity when muted.
    pub gain_db: f32,
    pub stats: SessionStats,
    pub payload: Option<PayloadKind>,
    pub channels: usize,
    pub bandwidth_khz: Option<u32>,
    /// Duration of the last packet, in milliseconds.
    pub frame_ms: u64,
    /// Audio buffered ahead of the read cursor, in milliseconds.
    pub queue_ms: i64,
    /// Whole seconds since this session's audio ran out.
    pub idle_secs: i64,
    pub write_cursor: SamplePos,
}

impl SessionSnapshot {
    /// Whether this session still has audio waiting to be played.
    pub fn is_active(&self) -> bool {
        self.queue_ms > 0
    }
}
