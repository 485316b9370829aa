//! The decode/mix thread run for every session.

mod playout;

use self::playout::{Action, Playout};
use crate::{
    codec::{pcm_to_stereo, Bandwidth, Decoder, PayloadKind},
    constants::*,
    error::{Error, Result},
    mix,
    monitor::MonitorState,
    packet::Packet,
    ring::{RingBuffer, SamplePos},
    session::{Controls, Pop, Session, SessionStats, StreamStatus},
};
use std::{sync::Arc, thread::JoinHandle};
use tracing::{debug, instrument, trace, warn};

/// Starts the worker thread for a newly created session.
///
/// `first` is the packet which created the session, and sets the
/// sequence and timing baselines.
pub(crate) fn spawn(
    shared: Arc<MonitorState>,
    session: Arc<Session>,
    first: &Packet,
) -> Result<JoinHandle<()>> {
    let worker = Worker::new(shared, session.clone(), first);

    let handle = std::thread::Builder::new()
        .name(format!("dec {}", session.ssrc()))
        .spawn(move || {
            trace!("Worker for {} started.", worker.session.key());
            runner(worker);
        })?;

    Ok(handle)
}

#[instrument(skip(worker), fields(ssrc = worker.session.ssrc()))]
fn runner(mut worker: Worker) {
    worker.run();
    trace!("Worker for {} finished.", worker.session.key());
}

/// Owns everything a session needs to turn packets into mixed audio.
///
/// Only this thread touches the decoder, timing state, and bounce buffer;
/// results are published to the shared session after every packet.
pub(crate) struct Worker {
    session: Arc<Session>,
    shared: Arc<MonitorState>,
    playout: Playout,
    decoder: Option<Box<dyn Decoder>>,
    bounce: Vec<f32>,
    stats: SessionStats,
    status: StreamStatus,
}

impl Worker {
    pub(crate) fn new(shared: Arc<MonitorState>, session: Arc<Session>, first: &Packet) -> Self {
        let read = shared.ring.lock().read_cursor();
        let playout = Playout::new(
            first.sequence,
            first.timestamp,
            read,
            shared.playout_samples(),
        );

        Self {
            session,
            shared,
            playout,
            decoder: None,
            bounce: vec![0.0; MAX_FRAME_SIZE * OUTPUT_CHANNELS],
            stats: SessionStats::default(),
            status: StreamStatus::default(),
        }
    }

    fn run(&mut self) {
        let poll = self.shared.config.worker_poll_interval;

        loop {
            match self.session.queue.pop_timeout(poll) {
                Pop::Packet(pkt) => self.process(&pkt),
                Pop::Idle => {},
                Pop::Cancelled => break,
            }
        }

        self.session.queue.clear();
        self.decoder = None;
    }

    /// Decodes and mixes one packet, then publishes the session's state.
    pub(crate) fn process(&mut self, pkt: &Packet) {
        if let Err(e) = self.mix_packet(pkt) {
            trace!(
                "Dropped packet {} from {}: {}",
                pkt.sequence,
                self.session.key(),
                e
            );
        }

        self.publish();
    }

    fn publish(&mut self) {
        self.status.write_cursor = self.playout.write_cursor();

        let stats = self.stats.clone();
        let status = self.status.clone();
        self.session.with_state(|state| {
            state.stats = stats;
            state.status = status;
        });
    }

    fn mix_packet(&mut self, pkt: &Packet) -> Result<()> {
        self.stats.packets += 1;

        let kind = PayloadKind::from_pt(pkt.payload_type);
        self.status.payload = Some(kind);
        let ratio = self.upsample_ratio(kind);

        if !self.playout.check_sequence(pkt.sequence, pkt.timestamp) {
            // A marker after silence is expected to jump.
            if !pkt.marker {
                self.stats.drops += 1;
                self.shared.note_drop();
            }
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.reset_state();
            }
        }

        if pkt.marker {
            self.stats.current_active = 0.0;
            let read = self.shared.ring.lock().read_cursor();
            self.resync(read, pkt.timestamp);
            self.resynced();
        }

        let frames = self.decode(kind, &pkt.payload)?;
        if frames == 0 {
            self.stats.empties += 1;
            return Ok(());
        }

        let target = self.playout.target(pkt.timestamp, ratio);
        let controls = self.session.controls();

        let shared = Arc::clone(&self.shared);
        let mut ring = shared.ring.lock();
        let read = ring.read_cursor();
        let verdict = self.playout.judge(target, read, ring.len());

        self.stats.lates += u64::from(verdict.late);
        self.stats.earlies += u64::from(verdict.early);

        let resync = match verdict.action {
            Action::Drop => {
                drop(ring);
                trace!(
                    "Packet {} from {} is {} samples off, dropped.",
                    pkt.sequence,
                    self.session.key(),
                    target - read
                );
                return Ok(());
            },
            Action::Resync => true,
            Action::Play => controls.reset,
        };

        if resync {
            self.resync(read, pkt.timestamp);
        }

        if !controls.muted {
            self.mix_into(&mut ring, frames, ratio, controls);
        }

        drop(ring);

        if resync {
            self.resynced();
        }

        self.status.last_target = self.playout.write_cursor();
        self.playout
            .advance(SamplePos::from(ratio) * frames as SamplePos);

        let secs = frames as f64 / f64::from(self.status.sample_rate);
        self.stats.total_active += secs;
        self.stats.current_active += secs;

        Ok(())
    }

    /// Output samples per RTP tick.
    fn upsample_ratio(&self, kind: PayloadKind) -> u32 {
        match kind.clock_rate() {
            0 => 1,
            clock => (self.shared.config.sample_rate / clock).max(1),
        }
    }

    /// Restarts playout timing as if the stream were new.
    ///
    /// Runs under the ring lock, so only timing state is touched here; the
    /// rest is left to `resynced`.
    fn resync(&mut self, read: SamplePos, timestamp: u32) {
        self.playout
            .resync(read, timestamp, self.shared.playout_samples());
    }

    /// Bookkeeping for a resync, once the ring is unlocked.
    ///
    /// Consumes any pending operator reset request.
    fn resynced(&mut self) {
        self.stats.resets += 1;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset_state();
        }

        self.session.with_state(|state| state.controls.reset = false);

        debug!(
            "Session {} resynced at {} (reset {}).",
            self.session.key(),
            self.playout.write_cursor(),
            self.stats.resets
        );
    }

    /// Decodes `payload` into the bounce buffer as stereo, returning the
    /// number of frames.
    ///
    /// Opus is always decoded, even when muted, so that decoder state
    /// tracks the stream.
    fn decode(&mut self, kind: PayloadKind, payload: &[u8]) -> Result<usize> {
        let frames = match kind {
            PayloadKind::Opus => {
                if self.decoder.is_none() {
                    self.decoder = Some((self.shared.config.decoder_factory)().map_err(|e| {
                        warn!(
                            "Couldn't create decoder for {}: {}",
                            self.session.key(),
                            e
                        );
                        e
                    })?);
                }

                let decoder = match self.decoder.as_mut() {
                    Some(decoder) => decoder,
                    None => return Err(Error::NoDecoder),
                };

                let frames = decoder.packet_sample_count(payload)?;
                if frames > MAX_FRAME_SIZE {
                    return Err(Error::InvalidOpusPacket);
                }

                self.status.bandwidth = Some(decoder.packet_bandwidth(payload)?);
                self.status.sample_rate = SAMPLE_RATE_RAW as u32;
                self.status.channels = OUTPUT_CHANNELS;

                decoder.decode(payload, &mut self.bounce[..])?
            },
            PayloadKind::Pcm {
                sample_rate,
                channels,
            } => {
                self.status.bandwidth = Some(Bandwidth::Pcm(sample_rate / 2000));
                self.status.sample_rate = sample_rate;
                self.status.channels = channels;

                pcm_to_stereo(payload, channels, &mut self.bounce[..])?
            },
            PayloadKind::Unknown(pt) => return Err(Error::UnsupportedPayload(pt)),
        };

        self.status.frame_size = frames;

        Ok(frames)
    }

    /// Adds the bounce buffer into the ring at the write cursor.
    fn mix_into(&self, ring: &mut RingBuffer, frames: usize, ratio: u32, controls: Controls) {
        let [left_gain, right_gain] = mix::pan_gains(controls.gain, controls.pan);
        let [left_delay, right_delay] =
            mix::pan_delays(controls.pan, self.shared.config.sample_rate);

        let left_start = self.playout.write_cursor() + left_delay as SamplePos;
        let right_start = self.playout.write_cursor() + right_delay as SamplePos;
        let ratio = ratio as usize;

        for (i, frame) in self.bounce[..frames * OUTPUT_CHANNELS]
            .chunks_exact(OUTPUT_CHANNELS)
            .enumerate()
        {
            for j in 0..ratio {
                let offset = (i * ratio + j) as SamplePos;
                ring.add(left_start + offset, 0, frame[0] * left_gain);
                ring.add(right_start + offset, 1, frame[1] * right_gain);
            }
        }
    }
}
