//! Receive, decode and output error handling.

#[cfg(feature = "opus")]
use audiopus::Error as OpusError;
use std::{error::Error as StdError, fmt, io::Error as IoError};

/// Convenience type for monitor error handling.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
#[non_exhaustive]
/// Errors raised while receiving, decoding or playing out audio.
///
/// Everything caused by a single received packet is handled locally
/// by dropping that packet; only setup failures are expected to reach
/// an application.
pub enum Error {
    /// Received a datagram too small or malformed to be an RTP packet.
    IllegalRtpPacket,
    /// RTP padding or header extension claimed more bytes than were present.
    BadPadding,
    /// The payload type has no known sample rate or channel layout.
    UnsupportedPayload(u8),
    /// The codec rejected a packet as invalid for its claimed size.
    InvalidOpusPacket,
    #[cfg(feature = "opus")]
    /// Opus decoder creation or decoding failed.
    Opus(OpusError),
    /// No Opus decoder is available in this build.
    NoDecoder,
    /// A socket or thread could not be created or used.
    Io(IoError),
    /// The session table has no room for a new stream.
    TableFull,
    /// The audio callback asked for more than half of the ring buffer.
    CallbackTooLarge {
        /// Frames requested by the callback.
        requested: usize,
        /// Length of the ring buffer, in frames.
        capacity: usize,
    },
    /// A [`Config`] value cannot be used.
    ///
    /// [`Config`]: crate::Config
    InvalidConfig(&'static str),
    #[cfg(feature = "sink-cpal")]
    /// The audio output device could not be opened or started.
    Sink(String),
}

impl Error {
    /// Indicates whether this error was caused by a single bad packet,
    /// and so should only cost that packet.
    pub fn is_per_packet(&self) -> bool {
        match self {
            Error::IllegalRtpPacket
            | Error::BadPadding
            | Error::UnsupportedPayload(_)
            | Error::InvalidOpusPacket => true,
            #[cfg(feature = "opus")]
            Error::Opus(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalRtpPacket => write!(f, "illegal RTP packet"),
            Error::BadPadding => write!(f, "RTP padding or extension overruns packet"),
            Error::UnsupportedPayload(pt) => write!(f, "unsupported payload type {}", pt),
            Error::InvalidOpusPacket => write!(f, "invalid Opus packet"),
            #[cfg(feature = "opus")]
            Error::Opus(e) => write!(f, "Opus failure: {}", e),
            Error::NoDecoder => write!(f, "no Opus decoder compiled in"),
            Error::Io(e) => write!(f, "I/O failure: {}", e),
            Error::TableFull => write!(f, "session table is full"),
            Error::CallbackTooLarge {
                requested,
                capacity,
            } => write!(
                f,
                "audio callback requested {} frames from a {} frame buffer",
                requested, capacity
            ),
            Error::InvalidConfig(why) => write!(f, "invalid config: {}", why),
            #[cfg(feature = "sink-cpal")]
            Error::Sink(why) => write!(f, "audio sink failure: {}", why),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            #[cfg(feature = "opus")]
            Error::Opus(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

#[cfg(feature = "opus")]
impl From<OpusError> for Error {
    fn from(e: OpusError) -> Error {
        Error::Opus(e)
    }
}
