//! Payload types, and conversion of received payloads into stereo PCM.
//!
//! Linear PCM is converted directly. Opus decoding is delegated to a
//! [`Decoder`], which by default wraps libopus via [`audiopus`].
//!
//! [`audiopus`]: https://github.com/lakelezz/audiopus

use crate::{
    constants::*,
    error::{Error, Result},
};
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;
use std::sync::Arc;

/// How the payload of a given RTP payload type is encoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum PayloadKind {
    /// Opus, with a 48kHz RTP clock.
    Opus,
    /// Big-endian signed 16-bit PCM.
    Pcm {
        /// Sample rate (and RTP clock rate) of the stream.
        sample_rate: u32,
        /// Interleaved channel count.
        channels: usize,
    },
    /// A payload type we cannot play.
    Unknown(u8),
}

impl PayloadKind {
    /// Maps a payload type onto its encoding.
    pub fn from_pt(pt: u8) -> Self {
        let pcm = |sample_rate, channels| Self::Pcm {
            sample_rate,
            channels,
        };

        match pt {
            OPUS_PT => Self::Opus,
            PCM_STEREO_PT => pcm(48_000, 2),
            PCM_MONO_PT => pcm(48_000, 1),
            PCM_MONO_24_PT => pcm(24_000, 1),
            PCM_STEREO_24_PT => pcm(24_000, 2),
            PCM_MONO_16_PT => pcm(16_000, 1),
            PCM_STEREO_16_PT => pcm(16_000, 2),
            PCM_MONO_12_PT => pcm(12_000, 1),
            PCM_STEREO_12_PT => pcm(12_000, 2),
            PCM_MONO_8_PT => pcm(8_000, 1),
            PCM_STEREO_8_PT => pcm(8_000, 2),
            other => Self::Unknown(other),
        }
    }

    /// RTP clock rate of this payload, or `0` if unknown.
    pub fn clock_rate(self) -> u32 {
        match self {
            Self::Opus => 48_000,
            Self::Pcm { sample_rate, .. } => sample_rate,
            Self::Unknown(_) => 0,
        }
    }

    /// Number of channels carried in the payload, or `0` if unknown.
    pub fn channels(self) -> usize {
        match self {
            Self::Opus => 2,
            Self::Pcm { channels, .. } => channels,
            Self::Unknown(_) => 0,
        }
    }
}

/// Audio bandwidth class reported for a stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Bandwidth {
    Narrowband,
    Mediumband,
    Wideband,
    SuperWideband,
    Fullband,
    /// Linear PCM: the Nyquist bandwidth of the sample rate, in kHz.
    Pcm(u32),
}

impl Bandwidth {
    /// Audio bandwidth in kHz.
    pub fn khz(self) -> u32 {
        match self {
            Self::Narrowband => 4,
            Self::Mediumband => 6,
            Self::Wideband => 8,
            Self::SuperWideband => 12,
            Self::Fullband => 20,
            Self::Pcm(khz) => khz,
        }
    }
}

/// An Opus decoder instance owned by a single session.
///
/// Decoder state carries prediction history between packets, so one
/// instance must see every packet of its stream in order. Dropping the
/// decoder releases it.
pub trait Decoder: Send {
    /// Decodes `payload` into interleaved stereo samples in `out`,
    /// returning the number of samples per channel.
    fn decode(&mut self, payload: &[u8], out: &mut [f32]) -> Result<usize>;

    /// Discards prediction history, e.g. after packet loss.
    fn reset_state(&mut self);

    /// Number of samples per channel `payload` will decode to.
    fn packet_sample_count(&self, payload: &[u8]) -> Result<usize>;

    /// Audio bandwidth class signalled by `payload`.
    fn packet_bandwidth(&self, payload: &[u8]) -> Result<Bandwidth>;
}

/// Creates a fresh [`Decoder`] for a new stream.
pub type DecoderFactory = Arc<dyn Fn() -> Result<Box<dyn Decoder>> + Send + Sync>;

#[cfg(feature = "opus")]
/// Creates libopus decoders producing 48kHz stereo.
pub fn opus_factory() -> DecoderFactory {
    Arc::new(|| Ok(Box::new(OpusDecoder::new()?) as Box<dyn Decoder>))
}

#[cfg(not(feature = "opus"))]
/// Without the `"opus"` feature, Opus streams cannot be decoded.
pub fn opus_factory() -> DecoderFactory {
    Arc::new(|| Err(Error::NoDecoder))
}

#[cfg(feature = "opus")]
pub use self::opus::OpusDecoder;

#[cfg(feature = "opus")]
mod opus {
    use super::*;
    use audiopus::{
        coder::{Decoder as AudiopusDecoder, GenericCtl},
        packet::{self as opus_packet, Packet as OpusPacket},
        Channels,
        SampleRate,
    };
    use std::convert::TryInto;

    /// [`Decoder`] backed by libopus.
    pub struct OpusDecoder {
        inner: AudiopusDecoder,
    }

    impl OpusDecoder {
        pub fn new() -> Result<Self> {
            Ok(Self {
                inner: AudiopusDecoder::new(SampleRate::Hz48000, Channels::Stereo)?,
            })
        }
    }

    impl Decoder for OpusDecoder {
        fn decode(&mut self, payload: &[u8], out: &mut [f32]) -> Result<usize> {
            let pkt: OpusPacket<'_> = payload.try_into()?;
            Ok(self.inner.decode_float(Some(pkt), out.try_into()?, false)?)
        }

        fn reset_state(&mut self) {
            if let Err(e) = self.inner.reset_state() {
                tracing::warn!("Failed to reset Opus decoder: {:?}", e);
            }
        }

        fn packet_sample_count(&self, payload: &[u8]) -> Result<usize> {
            payload
                .try_into()
                .and_then(|pkt| opus_packet::nb_samples(pkt, SampleRate::Hz48000))
                .map_err(|_| Error::InvalidOpusPacket)
        }

        fn packet_bandwidth(&self, payload: &[u8]) -> Result<Bandwidth> {
            let bw = payload
                .try_into()
                .and_then(opus_packet::bandwidth)
                .map_err(|_| Error::InvalidOpusPacket)?;

            // libopus bandwidth codes, OPUS_BANDWIDTH_NARROWBAND onwards.
            Ok(match bw as i32 {
                1101 => Bandwidth::Narrowband,
                1102 => Bandwidth::Mediumband,
                1103 => Bandwidth::Wideband,
                1104 => Bandwidth::SuperWideband,
                _ => Bandwidth::Fullband,
            })
        }
    }
}

/// Converts big-endian PCM into interleaved stereo `f32`, duplicating mono.
///
/// Returns the number of frames written, which is capped by the size of `out`.
pub fn pcm_to_stereo(payload: &[u8], channels: usize, out: &mut [f32]) -> Result<usize> {
    if channels == 0 || channels > 2 {
        return Err(Error::InvalidConfig("PCM must be mono or stereo"));
    }

    let frame_bytes = 2 * channels;
    let mut frames = 0;

    for (src, dst) in payload
        .chunks_exact(frame_bytes)
        .zip(out.chunks_exact_mut(OUTPUT_CHANNELS))
    {
        let left = PCM_SCALE * f32::from(BigEndian::read_i16(src));
        let right = if channels == 2 {
            PCM_SCALE * f32::from(BigEndian::read_i16(&src[2..]))
        } else {
            left
        };

        dst[0] = left;
        dst[1] = right;
        frames += 1;
    }

    Ok(frames)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_types_map_to_layouts() {
        assert_eq!(PayloadKind::from_pt(OPUS_PT), PayloadKind::Opus);
        assert_eq!(PayloadKind::from_pt(PCM_MONO_16_PT).clock_rate(), 16_000);
        assert_eq!(PayloadKind::from_pt(PCM_STEREO_8_PT).channels(), 2);
        assert_eq!(PayloadKind::from_pt(0).clock_rate(), 0);
        assert_eq!(PayloadKind::from_pt(0).channels(), 0);
    }

    #[test]
    fn mono_pcm_is_duplicated() {
        let payload = [0x40, 0x00, 0xC0, 0x00, 0x00, 0x00];
        let mut out = [1.0f32; 8];

        let frames = pcm_to_stereo(&payload, 1, &mut out).unwrap();
        let half = 16384.0 * PCM_SCALE;

        assert_eq!(frames, 3);
        assert_eq!(&out[..6], &[half, half, -half, -half, 0.0, 0.0]);
        assert_eq!(&out[6..], &[1.0, 1.0]);
    }

    #[test]
    fn stereo_pcm_keeps_channels_apart() {
        let payload = [0x40, 0x00, 0xC0, 0x00];
        let mut out = [0.0f32; 2];

        assert_eq!(pcm_to_stereo(&payload, 2, &mut out).unwrap(), 1);
        assert!((out[0] - 16384.0 * PCM_SCALE).abs() < f32::EPSILON);
        assert!((out[1] + 16384.0 * PCM_SCALE).abs() < f32::EPSILON);
    }

    #[test]
    fn trailing_partial_frame_is_ignored() {
        let payload = [0x00, 0x01, 0x00];
        let mut out = [0.0f32; 4];
        assert_eq!(pcm_to_stereo(&payload, 1, &mut out).unwrap(), 1);
    }

    #[test]
    fn impossible_channel_counts_are_rejected() {
        let mut out = [0.0f32; 4];
        assert!(pcm_to_stereo(&[0, 0], 0, &mut out).is_err());
        assert!(pcm_to_stereo(&[0, 0, 0, 0, 0, 0], 3, &mut out).is_err());
    }
}
