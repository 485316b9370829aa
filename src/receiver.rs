//! Routing of received datagrams into per-session queues.

use crate::{
    constants::DATAGRAM_MAX,
    error::{Error, Result},
    mix,
    monitor::MonitorState,
    packet::Packet,
    session::{Controls, Session, SessionKey},
    worker,
};
use bytes::{Bytes, BytesMut};
use std::{
    io::{self, ErrorKind},
    net::{SocketAddr, UdpSocket},
    sync::Arc,
};
use tracing::{debug, instrument, trace, warn};

/// Anything which yields datagrams along with their sender.
///
/// A read timeout should be set, so that the receive loop can notice
/// shutdown.
pub trait DatagramSource: Send {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl DatagramSource for UdpSocket {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf)
    }
}

/// Handles every datagram arriving on one feed.
#[derive(Clone, Debug)]
pub struct Receiver {
    feed: Arc<str>,
    shared: Arc<MonitorState>,
}

impl Receiver {
    pub(crate) fn new(feed: &str, shared: Arc<MonitorState>) -> Self {
        Self {
            feed: feed.into(),
            shared,
        }
    }

    /// Name of the feed this receiver serves.
    pub fn feed(&self) -> &str {
        &self.feed
    }

    /// Parses one datagram and queues it on its session, creating the
    /// session (and its worker) if this is a new stream.
    pub fn handle_datagram(&self, datagram: Bytes, sender: SocketAddr) -> Result<Arc<Session>> {
        let pkt = Packet::parse(datagram)?;
        let key = SessionKey {
            sender,
            ssrc: pkt.ssrc,
        };

        let (session, created) = self
            .shared
            .table
            .get_or_insert_with(key, || self.start_session(key, &pkt))
            .map_err(|e| {
                warn!("Couldn't start session {}: {}", key, e);
                e
            })?;

        if created {
            debug!("New session {} on feed {}.", key, self.feed);
        }

        if !session.queue.push(pkt) {
            trace!("Session {} is stopping, packet discarded.", key);
        }

        Ok(session)
    }

    /// Builds a session with its worker already attached, so that it is
    /// never visible without one.
    fn start_session(&self, key: SessionKey, first: &Packet) -> Result<Arc<Session>> {
        let session = Arc::new(self.new_session(key));
        let handle = worker::spawn(self.shared.clone(), session.clone(), first)?;
        session.set_worker(handle);

        Ok(session)
    }

    fn new_session(&self, key: SessionKey) -> Session {
        let pan = if self.shared.config.auto_position {
            mix::auto_position(self.shared.next_position())
        } else {
            0.0
        };

        let controls = Controls {
            gain: 1.0,
            pan,
            muted: self.shared.start_muted(),
            reset: true,
        };

        Session::new(
            key,
            self.feed.clone(),
            self.shared.labels.label_for(key.ssrc),
            controls,
        )
    }

    /// Receives from `source` until the monitor shuts down.
    ///
    /// Per-datagram failures are logged and skipped. Only an
    /// unrecoverable receive error ends the loop early.
    #[instrument(skip(self, source), fields(feed = %self.feed))]
    pub fn run<S: DatagramSource>(&self, mut source: S) -> Result<()> {
        trace!("Receiver started.");
        let mut byte_dest: Option<BytesMut> = None;

        while !self.shared.is_shutdown() {
            let mut buf = byte_dest
                .take()
                .unwrap_or_else(|| BytesMut::zeroed(DATAGRAM_MAX));

            match source.recv_datagram(&mut buf) {
                Ok((len, sender)) => {
                    buf.truncate(len);

                    if let Err(e) = self.handle_datagram(buf.freeze(), sender) {
                        if e.is_per_packet() {
                            trace!("Discarded datagram from {}: {}", sender, e);
                        }
                    }
                },
                Err(e) => {
                    byte_dest = Some(buf);

                    match e.kind() {
                        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {},
                        _ => {
                            warn!("Receive failed: {}", e);
                            return Err(Error::Io(e));
                        },
                    }
                },
            }
        }

        trace!("Receiver stopped.");

        Ok(())
    }
}
