#![deny(rustdoc::broken_intra_doc_links)]
//! A monitor for many simultaneous RTP audio streams, written in Rust.
//!
//! The library offers:
//!  * Discovery of streams by sender and SSRC, with a decode thread per stream
//!  which reorders packets, follows RTP timing across talk spurts and
//!  timestamp wraparound, and drops or resynchronises late and early traffic.
//!  * Decoding of Opus (via [audiopus], using the `"opus"` feature) and of
//!  linear PCM at 8, 12, 16, 24 and 48kHz.
//!  * Stereo mixing with per-stream gain, mute and pan, where panning uses both
//!  level and inter-channel delay.
//!  * A pull-style [`AudioCallback`] for any output device, and an adapter for the
//!  host's default device via [cpal] (using the `"sink-cpal"` feature).
//!
//! ## Data flow
//! Each feed runs a [`Receiver`], which parses datagrams and queues them on
//! the matching [`Session`]. Every session's worker decodes its queue in
//! sequence order and adds the audio into one shared ring of stereo frames, at
//! a position derived from the packet's RTP timestamp plus a playout delay.
//! The audio callback copies frames out of the ring and silences them behind
//! itself; its read cursor is the clock every stream is scheduled against.
//!
//! ```no_run
//! use rtp_monitor::{Config, Monitor};
//! use std::net::UdpSocket;
//!
//! # fn main() -> rtp_monitor::error::Result<()> {
//! let monitor = Monitor::new(Config::default())?;
//! monitor.add_feed("local", UdpSocket::bind("0.0.0.0:5004")?)?;
//!
//! let callback = monitor.audio_callback();
//! let mut out = vec![0.0f32; 2 * 480];
//! callback.fill(&mut out);
//! # Ok(())
//! # }
//! ```
//!
//! [audiopus]: https://github.com/lakelezz/audiopus
//! [cpal]: https://github.com/RustAudio/cpal

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
)]

pub mod codec;
mod config;
pub mod constants;
pub mod error;
pub mod labels;
pub mod mix;
mod monitor;
#[cfg(feature = "sink-cpal")]
pub mod output;
pub mod packet;
pub mod receiver;
pub mod ring;
pub mod session;
mod worker;

pub use crate::{
    config::Config,
    error::{Error, Result},
    labels::{LabelLookup, StaticLabels},
    monitor::Monitor,
    packet::Packet,
    receiver::{DatagramSource, Receiver},
    ring::{AudioCallback, SamplePos},
    session::{Controls, Session, SessionKey, SessionSnapshot, SessionStats, StreamStatus},
};

#[cfg(feature = "sink-cpal")]
pub use crate::output::AudioOutput;
