//! Conversion of raw sample words to volts and physical units.
//!
//! A sample word is a little endian two's complement integer of
//! `bytes_per_sample` bytes. The analog part is selected with the analog
//! mask (sign extended to the word width, so masking keeps the sign), the
//! marker bits with the marker mask.

use serde::{Deserialize, Serialize};

use crate::error::{BdfError, Result};

/// Bit partitioning of a sample word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    bytes_per_sample: u32,
    analog_mask: u32,
    marker_mask: u32,
    analog_mask_ext: i32,
}

impl SampleLayout {
    /// Validate a mask pair and derive the word width from it.
    pub fn new(analog_mask: u32, marker_mask: u32) -> Result<Self> {
        if analog_mask & marker_mask != 0 {
            return Err(BdfError::MaskOverlap { analog: analog_mask, marker: marker_mask });
        }
        if analog_mask == 0 {
            return Err(BdfError::InvalidArgument("analog mask must not be empty".into()));
        }
        let bits = 32 - (analog_mask | marker_mask).leading_zeros();
        let bytes = match bits.div_ceil(8) {
            1 => 1,
            2 => 2,
            _ => 4,
        };
        Ok(Self::from_parts(bytes, analog_mask, marker_mask))
    }

    pub(crate) fn from_parts(bytes_per_sample: u32, analog_mask: u32, marker_mask: u32) -> Self {
        SampleLayout {
            bytes_per_sample,
            analog_mask,
            marker_mask,
            analog_mask_ext: sign_extend(analog_mask, bytes_per_sample * 8),
        }
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.bytes_per_sample
    }

    /// Decode one word from exactly `bytes_per_sample` bytes, sign extended.
    pub fn decode_word(&self, bytes: &[u8]) -> i32 {
        match bytes.len() {
            1 => bytes[0] as i8 as i32,
            2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
            _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Analog value of a word with marker bits cleared.
    #[inline]
    pub fn analog(&self, word: i32) -> i32 {
        word & self.analog_mask_ext
    }

    #[inline]
    pub fn markers(&self, word: i32) -> u32 {
        word as u32 & self.marker_mask
    }

    pub fn analog_mask(&self) -> u32 {
        self.analog_mask
    }
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    if bits >= 32 {
        return value as i32;
    }
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// The three linear conversion steps of an input.
///
/// `bin_to_physical_*` is the composition of the other two and is derived
/// once when the input header is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub bin_to_volt_factor: f64,
    pub bin_to_volt_constant: f64,
    pub volt_to_physical_factor: f64,
    pub volt_to_physical_constant: f64,
    pub bin_to_physical_factor: f64,
    pub bin_to_physical_constant: f64,
}

impl Scaling {
    pub fn compose(
        bin_to_volt_factor: f64,
        bin_to_volt_constant: f64,
        volt_to_physical_factor: f64,
        volt_to_physical_constant: f64,
    ) -> Self {
        Scaling {
            bin_to_volt_factor,
            bin_to_volt_constant,
            volt_to_physical_factor,
            volt_to_physical_constant,
            bin_to_physical_factor: bin_to_volt_factor * volt_to_physical_factor,
            bin_to_physical_constant: bin_to_volt_constant * volt_to_physical_factor
                + volt_to_physical_constant,
        }
    }

    /// Scaling for an input whose full word spans `range` volts around `offset`.
    pub fn from_range(
        range: f64,
        offset: f64,
        bytes_per_sample: u32,
        volt_to_physical_factor: f64,
        volt_to_physical_constant: f64,
    ) -> Self {
        let steps = 2f64.powi(8 * bytes_per_sample as i32);
        Self::compose(range / steps, offset, volt_to_physical_factor, volt_to_physical_constant)
    }

    #[inline]
    pub fn volts(&self, analog: i32) -> f64 {
        analog as f64 * self.bin_to_volt_factor + self.bin_to_volt_constant
    }

    #[inline]
    pub fn physical_from_volts(&self, volts: f64) -> f64 {
        volts * self.volt_to_physical_factor + self.volt_to_physical_constant
    }

    #[inline]
    pub fn physical(&self, analog: i32) -> f64 {
        analog as f64 * self.bin_to_physical_factor + self.bin_to_physical_constant
    }

    pub fn volts_from_physical(&self, physical: f64) -> f64 {
        (physical - self.volt_to_physical_constant) / self.volt_to_physical_factor
    }

    /// Analog bin value (unrounded) for a voltage.
    pub fn bin_from_volts(&self, volts: f64) -> f64 {
        (volts - self.bin_to_volt_constant) / self.bin_to_volt_factor
    }

    /// Scale an analog min/max pair, keeping `min <= max` for negative factors.
    pub fn physical_pair(&self, min: i32, max: i32) -> (f64, f64) {
        let a = self.physical(min);
        let b = self.physical(max);
        if a <= b { (a, b) } else { (b, a) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_masks_rejected() {
        let err = SampleLayout::new(0xFFFC, 0x0004).unwrap_err();
        assert!(matches!(err, BdfError::MaskOverlap { .. }));
    }

    #[test]
    fn word_width_from_masks() -> Result<()> {
        assert_eq!(SampleLayout::new(0xF0, 0x0F)?.bytes_per_sample(), 1);
        assert_eq!(SampleLayout::new(0xFFFC, 0x3)?.bytes_per_sample(), 2);
        assert_eq!(SampleLayout::new(0x00FF_FF00, 0)?.bytes_per_sample(), 4);
        Ok(())
    }

    #[test]
    fn analog_keeps_sign_and_drops_markers() -> Result<()> {
        let layout = SampleLayout::new(0xFFFC, 0x0003)?;
        let word = layout.decode_word(&(-5i16).to_le_bytes());
        assert_eq!(word, -5);
        assert_eq!(layout.analog(word), -8);
        assert_eq!(layout.markers(word), 0b11);
        Ok(())
    }

    #[test]
    fn direct_path_matches_two_steps() {
        let s = Scaling::from_range(20.0, 0.5, 2, 3.0, -1.0);
        for raw in [-32768, -1, 0, 1, 12345, 32767] {
            let two_step = s.physical_from_volts(s.volts(raw));
            assert!((two_step - s.physical(raw)).abs() < 1e-9);
        }
    }

    #[test]
    fn inverse_scaling() {
        let s = Scaling::from_range(10.0, 0.0, 2, 4.0, 2.0);
        let volts = s.volts(1000);
        assert!((s.volts_from_physical(s.physical_from_volts(volts)) - volts).abs() < 1e-12);
        assert!((s.bin_from_volts(volts) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn negative_factor_pair_is_ordered() {
        let s = Scaling::compose(-1.0, 0.0, 1.0, 0.0);
        assert_eq!(s.physical_pair(-2, 5), (-5.0, 2.0));
    }
}
