use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len};
use crate::error::Result;
use crate::types::{DateTime, OperationMode};

/// GRBLOCK: one recording group (cluster).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBlock {
    pub header: BlockHeader,
    pub next_group_addr: u64,
    pub first_input_addr: u64,
    pub group_number: u32,
    pub mode: OperationMode,
    pub input_count: u32,
    pub trigger_sample: u32,
    pub timebase_divisor: u32,
    pub sample_rate: f64,
    pub start_time: DateTime,
}

impl GroupBlock {
    pub const SIZE: u64 = 104;
    pub const NEXT_LINK: u64 = 24;
    pub const FIRST_INPUT_LINK: u64 = 32;

    pub fn new(group_number: u32, mode: OperationMode) -> Self {
        GroupBlock {
            header: BlockHeader::new("##GR", Self::SIZE, 2),
            next_group_addr: 0,
            first_input_addr: 0,
            group_number,
            mode,
            input_count: 0,
            trigger_sample: 0,
            timebase_divisor: 1,
            sample_rate: 0.0,
            start_time: DateTime::default(),
        }
    }

    /// # Structure (104 bytes)
    /// - header (24), next group link (8), first input link (8)
    /// - group number u32, mode u8 + 3 reserved, input count u32,
    ///   trigger sample u32, timebase divisor u32, reserved u32
    /// - sample rate f64, start time (28), 4 bytes padding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.next_group_addr.to_le_bytes());
        buf.extend_from_slice(&self.first_input_addr.to_le_bytes());
        buf.extend_from_slice(&self.group_number.to_le_bytes());
        buf.push(self.mode.to_u8());
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.input_count.to_le_bytes());
        buf.extend_from_slice(&self.trigger_sample.to_le_bytes());
        buf.extend_from_slice(&self.timebase_divisor.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&self.start_time.to_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        debug_assert_eq!(buf.len() as u64, Self::SIZE);
        Ok(buf)
    }
}

impl BlockParse<'_> for GroupBlock {
    const ID: &'static str = "##GR";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        ensure_len(bytes, Self::SIZE as usize)?;
        Ok(GroupBlock {
            header,
            next_group_addr: LittleEndian::read_u64(&bytes[24..32]),
            first_input_addr: LittleEndian::read_u64(&bytes[32..40]),
            group_number: LittleEndian::read_u32(&bytes[40..44]),
            mode: OperationMode::from_u8(bytes[44])?,
            input_count: LittleEndian::read_u32(&bytes[48..52]),
            trigger_sample: LittleEndian::read_u32(&bytes[52..56]),
            timebase_divisor: LittleEndian::read_u32(&bytes[56..60]),
            sample_rate: LittleEndian::read_f64(&bytes[64..72]),
            start_time: DateTime::from_bytes(&bytes[72..100])?,
        })
    }
}
