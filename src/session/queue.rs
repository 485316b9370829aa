use crate::packet::{seq_at_or_after, Packet};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Result of waiting on a [`PacketQueue`].
#[derive(Debug)]
pub enum Pop {
    /// The earliest queued packet.
    Packet(Packet),
    /// Nothing arrived before the timeout.
    Idle,
    /// The queue's owner has been asked to stop.
    Cancelled,
}

#[derive(Debug, Default)]
struct QueueState {
    packets: VecDeque<Packet>,
    cancelled: bool,
}

/// A session's private packet queue, kept in sequence order.
///
/// Receivers insert into the queue and the session's worker waits on it.
/// Cancelling the queue wakes the worker at once, so the same lock doubles
/// as the worker's cancellation token.
#[derive(Debug, Default)]
pub struct PacketQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `packet` after every queued packet whose sequence number it
    /// is at or after, then wakes the worker.
    ///
    /// Once cancelled the queue accepts nothing, and `false` is returned.
    pub fn push(&self, packet: Packet) -> bool {
        let mut state = self.state.lock();
        if state.cancelled {
            return false;
        }

        let pos = state
            .packets
            .iter()
            .position(|queued| !seq_at_or_after(packet.sequence, queued.sequence))
            .unwrap_or(state.packets.len());
        state.packets.insert(pos, packet);

        self.cond.notify_one();
        true
    }

    /// Takes the earliest packet, waiting at most `timeout` for one to arrive.
    ///
    /// Cancellation takes priority over any queued packets.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.cancelled {
                return Pop::Cancelled;
            }

            if let Some(pkt) = state.packets.pop_front() {
                return Pop::Packet(pkt);
            }

            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return if state.cancelled {
                    Pop::Cancelled
                } else {
                    state.packets.pop_front().map_or(Pop::Idle, Pop::Packet)
                };
            }
        }
    }

    /// Asks the worker to stop, waking it if it is waiting.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().packets.is_empty()
    }

    /// Drops every queued packet.
    pub fn clear(&self) {
        self.state.lock().packets.clear();
    }
}
