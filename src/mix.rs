//! Stereo imaging and level helpers.

use crate::constants::MAX_PAN_DELAY_SECS;

/// Per-channel linear gains for a source at `gain` and stereo position `pan`.
///
/// Each channel sits at -6dB when centred, reaching 0dB when panned fully
/// towards it and silence when panned fully away.
#[inline]
pub fn pan_gains(gain: f32, pan: f32) -> [f32; 2] {
    [gain * (1.0 - pan) / 2.0, gain * (1.0 + pan) / 2.0]
}

/// Per-channel delays, in output samples, for a source at `pan`.
///
/// The channel further from the source is delayed by up to 1.5ms, which
/// drives localisation far more than level differences do.
#[inline]
pub fn pan_delays(pan: f32, sample_rate: u32) -> [usize; 2] {
    let delay = |p: f32| {
        if p > 0.0 {
            (p * MAX_PAN_DELAY_SECS * sample_rate as f32).round() as usize
        } else {
            0
        }
    };

    [delay(pan), delay(-pan)]
}

/// Stereo position for the `n`th automatically placed stream.
///
/// Reversing the low 8 bits of `n` spreads successive streams across the
/// field (-0.5, 0, -0.25, +0.25, ...) instead of stacking them left to right.
pub fn auto_position(n: u32) -> f32 {
    let reversed = (n as u8).reverse_bits();
    0.5 * (f32::from(reversed) / 128.0 - 1.0)
}

/// Converts a voltage ratio to decibels.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}

/// Converts decibels to a voltage ratio.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_unity_is_half_per_channel() {
        assert_eq!(pan_gains(1.0, 0.0), [0.5, 0.5]);
        assert_eq!(pan_delays(0.0, 48_000), [0, 0]);
    }

    #[test]
    fn hard_pan_silences_far_channel() {
        assert_eq!(pan_gains(1.0, 1.0), [0.0, 1.0]);
        assert_eq!(pan_gains(2.0, -1.0), [2.0, 0.0]);
    }

    #[test]
    fn far_channel_is_delayed() {
        // Source on the right: delay the left ear.
        assert_eq!(pan_delays(1.0, 48_000), [72, 0]);
        assert_eq!(pan_delays(-0.5, 48_000), [0, 36]);
    }

    #[test]
    fn positions_are_bit_reversed() {
        assert_eq!(auto_position(0), -0.5);
        assert_eq!(auto_position(1), 0.0);
        assert_eq!(auto_position(2), -0.25);
        assert_eq!(auto_position(3), 0.25);
        for n in 0..256 {
            let p = auto_position(n);
            assert!((-0.5..0.5).contains(&p));
        }
    }

    #[test]
    fn db_round_trip() {
        assert!((db_to_gain(1.0) - crate::constants::ONE_DB).abs() < 1e-5);
        assert!(gain_to_db(1.0).abs() < f32::EPSILON);
        assert!((gain_to_db(db_to_gain(-6.0)) + 6.0).abs() < 1e-4);
    }
}
