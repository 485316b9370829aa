//! RTP framing for received datagrams.

use crate::{
    constants::*,
    error::{Error, Result},
};
use bytes::Bytes;
use discortp::{
    rtp::{RtpExtensionPacket, RtpPacket},
    Packet as _,
    PacketSize,
};

/// A received RTP packet, reduced to the fields used for playout.
///
/// `payload` has already had any CSRCs, header extension and trailing
/// padding removed, and shares storage with the original datagram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub sequence: u16,
    pub timestamp: u32,
    pub marker: bool,
    pub payload_type: u8,
    pub ssrc: u32,
    pub payload: Bytes,
}

impl Packet {
    /// Parses and validates one datagram.
    ///
    /// Runts, non-v2 headers and padding or extensions which overrun the
    /// datagram are rejected, as are packets left with no payload.
    pub fn parse(datagram: Bytes) -> Result<Self> {
        if datagram.len() <= RTP_MIN_SIZE {
            return Err(Error::IllegalRtpPacket);
        }

        let rtp = RtpPacket::new(&datagram).ok_or(Error::IllegalRtpPacket)?;

        if rtp.get_version() != RTP_VERSION {
            return Err(Error::IllegalRtpPacket);
        }

        // CSRCs are 32-bit words.
        let mut start = RTP_MIN_SIZE + 4 * usize::from(rtp.get_csrc_count());
        let mut end = datagram.len();

        if start >= end {
            return Err(Error::IllegalRtpPacket);
        }

        if rtp.get_extension() != 0 {
            let ext_len = RtpExtensionPacket::new(&datagram[start..])
                .map(|ext| ext.packet_size())
                .ok_or(Error::BadPadding)?;
            start += ext_len;
        }

        if rtp.get_padding() != 0 {
            let pad = usize::from(datagram[end - 1]);
            end = end.checked_sub(pad).ok_or(Error::BadPadding)?;
        }

        if start >= end {
            return Err(Error::BadPadding);
        }

        Ok(Self {
            sequence: rtp.get_sequence().0 .0,
            timestamp: rtp.get_timestamp().0 .0,
            marker: rtp.get_marker() != 0,
            payload_type: rtp.packet()[1] & 0x7F,
            ssrc: rtp.get_ssrc(),
            payload: datagram.slice(start..end),
        })
    }
}

/// Returns whether sequence number `a` is at or after `b`, allowing for wraparound.
#[inline]
pub fn seq_at_or_after(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) >= 0
}


#[cfg(test)]
mod tests {
    use super::{test_utils::*, *};

    #[test]
    fn header_fields_are_extracted() {
        let dg = rtp_datagram(OPUS_PT, 0xFFFE, 0x1234_5678, 42, true, &[1, 2, 3]);
        let pkt = Packet::parse(dg).unwrap();

        assert_eq!(pkt.sequence, 0xFFFE);
        assert_eq!(pkt.timestamp, 0x1234_5678);
        assert!(pkt.marker);
        assert_eq!(pkt.payload_type, OPUS_PT);
        assert_eq!(pkt.ssrc, 42);
        assert_eq!(&pkt.payload[..], &[1, 2, 3]);
    }

    #[test]
    fn csrcs_are_skipped() {
        let dg = rtp_datagram_with(&[0x0102_0304], None, &[5, 6, 7]);
        assert_eq!(&Packet::parse(dg).unwrap().payload[..], &[5, 6, 7]);

        let dg = rtp_datagram_with(&[1, 2, 3], None, &[9]);
        assert_eq!(&Packet::parse(dg).unwrap().payload[..], &[9]);
    }

    #[test]
    fn header_extension_is_skipped() {
        let dg = rtp_datagram_with(&[], Some((0xBEDE, &[0x10, 0xAA, 0, 0])), &[5, 6, 7]);
        assert_eq!(&Packet::parse(dg).unwrap().payload[..], &[5, 6, 7]);

        let dg = rtp_datagram_with(&[77], Some((0x1000, &[1, 2, 3, 4, 5])), &[8, 9]);
        let pkt = Packet::parse(dg).unwrap();
        assert_eq!(&pkt.payload[..], &[8, 9]);
        assert_eq!(pkt.ssrc, 42);
    }

    #[test]
    fn overlong_csrcs_or_extension_are_rejected() {
        let mut raw = rtp_datagram(OPUS_PT, 1, 1, 1, false, &[0; 8]).to_vec();
        raw[0] |= 0x03;
        assert!(matches!(
            Packet::parse(raw.into()),
            Err(Error::IllegalRtpPacket)
        ));

        let mut raw = rtp_datagram_with(&[], Some((0xBEDE, &[0; 4])), &[1]).to_vec();
        raw[RTP_MIN_SIZE + 3] = 9;
        assert!(matches!(Packet::parse(raw.into()), Err(Error::BadPadding)));
    }

    #[test]
    fn runts_are_rejected() {
        let dg = rtp_datagram(OPUS_PT, 1, 1, 1, false, &[]);
        assert!(matches!(Packet::parse(dg), Err(Error::IllegalRtpPacket)));
        assert!(matches!(
            Packet::parse(Bytes::from_static(&[0x80; 4])),
            Err(Error::IllegalRtpPacket)
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut raw = rtp_datagram(OPUS_PT, 1, 1, 1, false, &[9, 9]).to_vec();
        raw[0] = 1 << 6;
        assert!(matches!(
            Packet::parse(raw.into()),
            Err(Error::IllegalRtpPacket)
        ));
    }

    #[test]
    fn padding_is_stripped() {
        let mut raw = rtp_datagram(OPUS_PT, 1, 1, 1, false, &[7, 7, 7, 0, 0, 3]).to_vec();
        raw[0] |= 0x20;
        let pkt = Packet::parse(raw.into()).unwrap();

        assert_eq!(&pkt.payload[..], &[7, 7, 7]);
    }

    #[test]
    fn padding_covering_payload_is_rejected() {
        let mut raw = rtp_datagram(OPUS_PT, 1, 1, 1, false, &[0, 2]).to_vec();
        raw[0] |= 0x20;
        assert!(matches!(Packet::parse(raw.into()), Err(Error::BadPadding)));

        let mut raw = rtp_datagram(OPUS_PT, 1, 1, 1, false, &[0, 200]).to_vec();
        raw[0] |= 0x20;
        assert!(matches!(Packet::parse(raw.into()), Err(Error::BadPadding)));
    }

    #[test]
    fn sequence_comparison_wraps() {
        assert!(seq_at_or_after(5, 5));
        assert!(seq_at_or_after(6, 5));
        assert!(!seq_at_or_after(4, 5));
        assert!(seq_at_or_after(2, 0xFFFF));
        assert!(!seq_at_or_after(0xFFFF, 2));
    }
}
