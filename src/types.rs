//! Plain value types shared by the writer, the parser and the public API.

use serde::{Deserialize, Serialize};

use crate::error::{BdfError, Result};
use crate::scaling::{SampleLayout, Scaling};

/// Recording mode of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperationMode {
    #[default]
    Continuous,
    SingleEventRecorder,
    MultiEventRecorder,
    SingleEventRecorderDual,
    MultiEventRecorderDual,
}

impl OperationMode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(OperationMode::Continuous),
            1 => Ok(OperationMode::SingleEventRecorder),
            2 => Ok(OperationMode::MultiEventRecorder),
            3 => Ok(OperationMode::SingleEventRecorderDual),
            4 => Ok(OperationMode::MultiEventRecorderDual),
            other => Err(BdfError::BlockSerializationError(format!(
                "unknown operation mode {}",
                other
            ))),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            OperationMode::Continuous => 0,
            OperationMode::SingleEventRecorder => 1,
            OperationMode::MultiEventRecorder => 2,
            OperationMode::SingleEventRecorderDual => 3,
            OperationMode::MultiEventRecorderDual => 4,
        }
    }

    /// Dual timebase variants record with a second, divided sample clock.
    pub fn is_dual(self) -> bool {
        matches!(
            self,
            OperationMode::SingleEventRecorderDual | OperationMode::MultiEventRecorderDual
        )
    }

    /// Inputs trigger independently, so block counts may differ per input.
    pub fn independent_inputs(self) -> bool {
        matches!(
            self,
            OperationMode::SingleEventRecorder | OperationMode::SingleEventRecorderDual
        )
    }

    pub fn has_stop_trigger(self) -> bool {
        matches!(
            self,
            OperationMode::MultiEventRecorder | OperationMode::MultiEventRecorderDual
        )
    }
}

/// Calendar timestamp of a start command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

impl DateTime {
    /// Encoded size in bytes.
    pub const SIZE: usize = 28;

    pub fn new(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32, millisecond: u32) -> Self {
        DateTime { year, month, day, hour, minute, second, millisecond }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let fields = [
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond,
        ];
        for (chunk, value) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(BdfError::TooShortBuffer {
                actual:   bytes.len(),
                expected: Self::SIZE,
                file:     file!(),
                line:     line!(),
            });
        }
        let mut fields = [0u32; 7];
        for (value, chunk) in fields.iter_mut().zip(bytes[..Self::SIZE].chunks_exact(4)) {
            *value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let [year, month, day, hour, minute, second, millisecond] = fields;
        Ok(DateTime { year, month, day, hour, minute, second, millisecond })
    }
}

/// Parameters of `init_file_writer`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Cluster number of the group as known to the acquisition system.
    pub group: u32,
    pub start_time: DateTime,
    pub mode: OperationMode,
    pub sample_rate: f64,
    /// Divisor of the second timebase (dual modes).
    pub timebase_divisor: u32,
    /// Index of the trigger sample inside every block.
    pub trigger_sample: u32,
}

impl GroupSettings {
    pub fn new(group: u32, mode: OperationMode, sample_rate: f64) -> Self {
        GroupSettings {
            group,
            start_time: DateTime::default(),
            mode,
            sample_rate,
            timebase_divisor: 1,
            trigger_sample: 0,
        }
    }
}

/// Parameters of `write_input_header`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputHeader {
    pub board: u32,
    pub input: u32,
    pub analog_mask: u32,
    pub marker_mask: u32,
    /// Full scale span in volts.
    pub range: f64,
    /// Offset in volts.
    pub offset: f64,
    pub volt_to_physical_factor: f64,
    pub volt_to_physical_constant: f64,
}

impl InputHeader {
    /// A 16 bit input without markers, scaled 1:1 from volts to physical units.
    pub fn new(board: u32, input: u32, range: f64) -> Self {
        InputHeader {
            board,
            input,
            analog_mask: 0xFFFF,
            marker_mask: 0,
            range,
            offset: 0.0,
            volt_to_physical_factor: 1.0,
            volt_to_physical_constant: 0.0,
        }
    }
}

/// Static description of one input channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputInfo {
    pub bytes_per_sample: u32,
    pub analog_mask: u32,
    pub marker_mask: u32,
    /// Markers are the rightmost bits in the sample word.
    pub number_of_marker_bits: u32,
    pub resolution_in_bits: u32,
    pub bin_to_volt_factor: f64,
    pub bin_to_volt_constant: f64,
    pub volt_to_physical_factor: f64,
    pub volt_to_physical_constant: f64,
    pub bin_to_physical_factor: f64,
    pub bin_to_physical_constant: f64,
    pub board_number: u32,
    pub input_number: u32,
}

impl InputInfo {
    /// Validate a header and derive the full channel description from it.
    pub fn from_header(header: &InputHeader) -> Result<Self> {
        let layout = SampleLayout::new(header.analog_mask, header.marker_mask)?;
        if !header.range.is_finite() || header.range <= 0.0 {
            return Err(BdfError::InvalidArgument(format!("range must be positive, got {}", header.range)));
        }
        if !header.offset.is_finite()
            || !header.volt_to_physical_factor.is_finite()
            || !header.volt_to_physical_constant.is_finite()
        {
            return Err(BdfError::InvalidArgument("scaling constants must be finite".into()));
        }
        let scaling = Scaling::from_range(
            header.range,
            header.offset,
            layout.bytes_per_sample(),
            header.volt_to_physical_factor,
            header.volt_to_physical_constant,
        );
        Ok(InputInfo {
            bytes_per_sample: layout.bytes_per_sample(),
            analog_mask: header.analog_mask,
            marker_mask: header.marker_mask,
            number_of_marker_bits: header.marker_mask.count_ones(),
            resolution_in_bits: header.analog_mask.count_ones(),
            bin_to_volt_factor: scaling.bin_to_volt_factor,
            bin_to_volt_constant: scaling.bin_to_volt_constant,
            volt_to_physical_factor: scaling.volt_to_physical_factor,
            volt_to_physical_constant: scaling.volt_to_physical_constant,
            bin_to_physical_factor: scaling.bin_to_physical_factor,
            bin_to_physical_constant: scaling.bin_to_physical_constant,
            board_number: header.board,
            input_number: header.input,
        })
    }

    pub fn layout(&self) -> SampleLayout {
        SampleLayout::from_parts(self.bytes_per_sample, self.analog_mask, self.marker_mask)
    }

    pub fn scaling(&self) -> Scaling {
        Scaling {
            bin_to_volt_factor: self.bin_to_volt_factor,
            bin_to_volt_constant: self.bin_to_volt_constant,
            volt_to_physical_factor: self.volt_to_physical_factor,
            volt_to_physical_constant: self.volt_to_physical_constant,
            bin_to_physical_factor: self.bin_to_physical_factor,
            bin_to_physical_constant: self.bin_to_physical_constant,
        }
    }
}

/// Timing and reduction metadata of one recorded block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Samples summarized by one envelope min/max pair of the first curve.
    pub reduction_factor: u32,
    /// Number of envelope curves; each is reduced by `reduction_factor` from the previous one.
    pub number_of_reductions: u32,
    /// Largest number of samples stored contiguously in the file.
    pub preferred_transfer_size: u32,
    /// Number of samples in the block.
    pub block_length: u64,
    pub external_timebase: bool,
    pub sample_rate_hertz: f64,
    pub timebase_divisor: u32,
    pub start_time: DateTime,
    /// Trigger time since start of recording in seconds.
    pub trigger_time_seconds: f64,
    /// The sample associated with time zero.
    pub trigger_sample: u64,
    pub stop_trigger_sample: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_time_roundtrip() -> Result<()> {
        let t = DateTime::new(2024, 2, 29, 23, 59, 58, 999);
        assert_eq!(DateTime::from_bytes(&t.to_bytes())?, t);
        Ok(())
    }

    #[test]
    fn input_info_composes_scaling() -> Result<()> {
        let mut header = InputHeader::new(1, 3, 20.0);
        header.analog_mask = 0xFFFC;
        header.marker_mask = 0x0003;
        header.volt_to_physical_factor = 2.0;
        header.volt_to_physical_constant = 1.0;
        let info = InputInfo::from_header(&header)?;
        assert_eq!(info.bytes_per_sample, 2);
        assert_eq!(info.resolution_in_bits, 14);
        assert_eq!(info.number_of_marker_bits, 2);
        assert_eq!(info.bin_to_volt_factor, 20.0 / 65536.0);
        assert_eq!(info.bin_to_physical_factor, 2.0 * 20.0 / 65536.0);
        assert_eq!(info.bin_to_physical_constant, 1.0);
        Ok(())
    }

    #[test]
    fn invalid_range_rejected() {
        let header = InputHeader::new(0, 0, 0.0);
        assert!(InputInfo::from_header(&header).is_err());
    }
}
