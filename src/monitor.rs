use crate::{
    config::{self, Config},
    error::Result,
    labels::LabelLookup,
    receiver::{DatagramSource, Receiver},
    ring::{AudioCallback, RingBuffer, SamplePos, SharedRing},
    session::{Session, SessionKey, SessionSnapshot, SessionTable},
};
use derivative::Derivative;
use parking_lot::Mutex;
use std::{
    cmp::Reverse,
    convert::TryFrom,
    net::UdpSocket,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, trace, warn};

/// State shared by the monitor, its receivers, and every session worker.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct MonitorState {
    pub(crate) config: Config,
    pub(crate) ring: SharedRing,
    pub(crate) table: SessionTable,
    #[derivative(Debug = "ignore")]
    pub(crate) labels: Arc<dyn LabelLookup>,
    playout_us: AtomicU64,
    start_muted: AtomicBool,
    next_position: AtomicU32,
    last_drop: Mutex<Instant>,
    shutdown: AtomicBool,
}

impl MonitorState {
    pub(crate) fn new(config: Config, labels: Arc<dyn LabelLookup>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            ring: RingBuffer::shared(config.ring_length)?,
            table: SessionTable::new(config.max_sessions),
            labels,
            playout_us: AtomicU64::new(duration_us(config.playout_delay)),
            start_muted: AtomicBool::new(config.start_muted),
            next_position: AtomicU32::new(0),
            last_drop: Mutex::new(Instant::now()),
            shutdown: AtomicBool::new(false),
            config,
        })
    }

    pub(crate) fn playout_delay(&self) -> Duration {
        Duration::from_micros(self.playout_us.load(Ordering::Relaxed))
    }

    /// Current playout delay, in output samples.
    pub(crate) fn playout_samples(&self) -> SamplePos {
        config::playout_samples(self.playout_delay(), self.config.sample_rate)
    }

    pub(crate) fn start_muted(&self) -> bool {
        self.start_muted.load(Ordering::Relaxed)
    }

    /// Claims the next automatic stereo position.
    pub(crate) fn next_position(&self) -> u32 {
        self.next_position.fetch_add(1, Ordering::Relaxed)
    }

    /// Records that some session just lost a packet.
    pub(crate) fn note_drop(&self) {
        *self.last_drop.lock() = Instant::now();
    }

    pub(crate) fn error_free_since(&self) -> Instant {
        *self.last_drop.lock()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// A running multi-stream monitor.
///
/// Owns the output ring, the session table, and the receive threads for
/// each feed. Audio leaves through the [`AudioCallback`], which an output
/// device should call from its own thread.
///
/// Dropping the monitor stops all receivers and workers.
#[derive(Debug)]
pub struct Monitor {
    shared: Arc<MonitorState>,
    feeds: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    /// Creates a monitor with no session labels.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_labels(config, Arc::new(()))
    }

    /// Creates a monitor which names new sessions using `labels`.
    pub fn with_labels(config: Config, labels: Arc<dyn LabelLookup>) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(MonitorState::new(config, labels)?),
            feeds: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Callback draining mixed audio for an output device.
    pub fn audio_callback(&self) -> AudioCallback {
        AudioCallback::new(self.shared.ring.clone())
    }

    #[cfg(feature = "sink-cpal")]
    /// Starts playback on the host's default output device.
    pub fn open_output(&self) -> Result<crate::output::AudioOutput> {
        crate::output::AudioOutput::open_default(
            self.audio_callback(),
            self.shared.config.sample_rate,
        )
    }

    /// Position of the next frame the output device will play.
    pub fn read_cursor(&self) -> SamplePos {
        self.shared.ring.lock().read_cursor()
    }

    /// A receiver for datagrams from `feed`, for callers driving their own
    /// receive loop.
    pub fn receiver(&self, feed: &str) -> Receiver {
        Receiver::new(feed, self.shared.clone())
    }

    /// Starts a receive thread for `socket`, an already bound (and, where
    /// needed, joined) UDP socket.
    pub fn add_feed(&self, name: &str, socket: UdpSocket) -> Result<()> {
        socket.set_read_timeout(Some(self.shared.config.worker_poll_interval))?;
        self.add_source(name, socket)
    }

    /// Starts a receive thread pulling from `source`.
    pub fn add_source<S>(&self, name: &str, source: S) -> Result<()>
    where
        S: DatagramSource + 'static,
    {
        let receiver = self.receiver(name);
        let handle = std::thread::Builder::new()
            .name(format!("mon {}", name))
            .spawn(move || {
                if let Err(e) = receiver.run(source) {
                    error!("Feed {} stopped: {}", receiver.feed(), e);
                }
            })?;

        info!("Listening on feed {}.", name);
        self.feeds.lock().push(handle);

        Ok(())
    }

    /// All sessions, in display order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.shared.table.snapshot()
    }

    pub fn session(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.shared.table.lookup(key)
    }

    /// Copies of every session's state, in display order.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let read = self.read_cursor();
        let rate = self.shared.config.sample_rate;

        self.sessions()
            .iter()
            .map(|s| s.snapshot(read, rate))
            .collect()
    }

    fn with_session(&self, key: &SessionKey, f: impl FnOnce(&Session)) -> bool {
        match self.session(key) {
            Some(s) => {
                f(&s);
                true
            },
            None => false,
        }
    }

    /// Sets a session's linear gain. Returns `false` if there is no such session.
    pub fn set_gain(&self, key: &SessionKey, gain: f32) -> bool {
        self.with_session(key, |s| s.set_gain(gain))
    }

    /// Steps a session's gain by `db` decibels.
    pub fn adjust_gain_db(&self, key: &SessionKey, db: f32) -> bool {
        self.with_session(key, |s| s.adjust_gain_db(db))
    }

    pub fn set_pan(&self, key: &SessionKey, pan: f32) -> bool {
        self.with_session(key, |s| s.set_pan(pan))
    }

    pub fn nudge_pan(&self, key: &SessionKey, delta: f32) -> bool {
        self.with_session(key, |s| s.nudge_pan(delta))
    }

    pub fn mute(&self, key: &SessionKey) -> bool {
        self.with_session(key, Session::mute)
    }

    pub fn unmute(&self, key: &SessionKey) -> bool {
        self.with_session(key, Session::unmute)
    }

    pub fn request_reset(&self, key: &SessionKey) -> bool {
        self.with_session(key, Session::request_reset)
    }

    pub fn mute_all(&self) {
        for s in self.sessions() {
            s.mute();
        }
    }

    pub fn unmute_all(&self) {
        for s in self.sessions() {
            s.unmute();
        }
    }

    /// Stops a session's worker, waits for it to exit, then forgets the
    /// session.
    ///
    /// A later packet from the same stream starts a fresh session.
    pub fn remove(&self, key: &SessionKey) -> bool {
        let session = match self.session(key) {
            Some(s) => s,
            None => return false,
        };

        session.terminate();
        session.join();
        self.shared.table.remove(&session);
        debug!("Removed session {}.", key);

        true
    }

    pub fn start_muted(&self) -> bool {
        self.shared.start_muted()
    }

    /// Sets whether sessions discovered from now on start muted.
    pub fn set_start_muted(&self, muted: bool) {
        self.shared.start_muted.store(muted, Ordering::Relaxed);
    }

    pub fn playout_delay(&self) -> Duration {
        self.shared.playout_delay()
    }

    /// Lengthens (or, if negative, shortens) the playout delay by `ms`,
    /// returning the new delay.
    ///
    /// The delay never drops below zero: a negative delay would schedule
    /// every packet behind the read cursor, where it can only be late.
    /// When the delay changes, every session is asked to resync so that
    /// the new delay is heard on its next packet.
    pub fn adjust_playout(&self, ms: i64) -> Duration {
        let step = ms.unsigned_abs().saturating_mul(1000);
        let update = |us: u64| {
            Some(if ms < 0 {
                us.saturating_sub(step)
            } else {
                us.saturating_add(step)
            })
        };

        let old = self
            .shared
            .playout_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, update)
            .unwrap_or_else(|us| us);
        let new = update(old).unwrap_or(old);

        trace!("Playout delay now {}us.", new);

        if new != old {
            for s in self.sessions() {
                s.request_reset();
            }
        }

        Duration::from_micros(new)
    }

    /// Orders sessions with audio queued ahead of those without.
    ///
    /// Active sessions are ordered by how long they have been talking,
    /// treating spurts within 0.1s as equal. Idle sessions are ordered
    /// with the most recently heard first.
    pub fn sort_by_activity(&self) {
        let read = self.read_cursor();

        self.shared.table.reorder(|s| {
            let write = s.status().write_cursor;
            if write > read {
                (false, Reverse(tenths(s.stats().current_active)), Reverse(0))
            } else {
                (true, Reverse(0), Reverse(write))
            }
        });
    }

    /// Orders sessions by total talk time, longest first.
    pub fn sort_by_total(&self) {
        self.shared
            .table
            .reorder(|s| Reverse(tenths(s.stats().total_active)));
    }

    /// Time since any session last lost a packet, or since start-up.
    pub fn error_free_duration(&self) -> Duration {
        self.shared.error_free_since().elapsed()
    }

    /// Stops every receiver and worker, and empties the session table.
    ///
    /// Receivers notice within their read timeout.
    pub fn shutdown(&self) {
        self.shared.begin_shutdown();

        let feeds = std::mem::take(&mut *self.feeds.lock());
        for feed in feeds {
            if feed.join().is_err() {
                warn!("Feed thread panicked.");
            }
        }

        let sessions = self.shared.table.drain();
        for s in &sessions {
            s.terminate();
        }
        for s in &sessions {
            s.join();
        }

        debug!("Monitor shut down ({} sessions).", sessions.len());
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tenths(secs: f64) -> i64 {
    (secs * 10.0).round() as i64
}
