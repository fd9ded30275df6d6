use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len};
use crate::error::Result;
use crate::types::InputInfo;

/// INBLOCK: static description of one input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputBlock {
    pub header: BlockHeader,
    pub next_input_addr: u64,
    pub first_block_addr: u64,
    pub attributes_addr: u64,
    pub info: InputInfo,
    pub block_count: u32,
}

impl InputBlock {
    pub const SIZE: u64 = 128;
    pub const NEXT_LINK: u64 = 24;
    pub const FIRST_BLOCK_LINK: u64 = 32;

    pub fn new(info: InputInfo) -> Self {
        InputBlock {
            header: BlockHeader::new("##IN", Self::SIZE, 3),
            next_input_addr: 0,
            first_block_addr: 0,
            attributes_addr: 0,
            info,
            block_count: 0,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let i = &self.info;
        let mut buf = Vec::with_capacity(Self::SIZE as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.next_input_addr.to_le_bytes());
        buf.extend_from_slice(&self.first_block_addr.to_le_bytes());
        buf.extend_from_slice(&self.attributes_addr.to_le_bytes());
        for v in [
            i.board_number,
            i.input_number,
            i.analog_mask,
            i.marker_mask,
            i.number_of_marker_bits,
            i.resolution_in_bits,
            i.bytes_per_sample,
            self.block_count,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in [
            i.bin_to_volt_factor,
            i.bin_to_volt_constant,
            i.volt_to_physical_factor,
            i.volt_to_physical_constant,
            i.bin_to_physical_factor,
            i.bin_to_physical_constant,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        debug_assert_eq!(buf.len() as u64, Self::SIZE);
        Ok(buf)
    }
}

impl BlockParse<'_> for InputBlock {
    const ID: &'static str = "##IN";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        ensure_len(bytes, Self::SIZE as usize)?;
        let u32_at = |off: usize| LittleEndian::read_u32(&bytes[off..off + 4]);
        let f64_at = |off: usize| LittleEndian::read_f64(&bytes[off..off + 8]);
        let info = InputInfo {
            board_number: u32_at(48),
            input_number: u32_at(52),
            analog_mask: u32_at(56),
            marker_mask: u32_at(60),
            number_of_marker_bits: u32_at(64),
            resolution_in_bits: u32_at(68),
            bytes_per_sample: u32_at(72),
            bin_to_volt_factor: f64_at(80),
            bin_to_volt_constant: f64_at(88),
            volt_to_physical_factor: f64_at(96),
            volt_to_physical_constant: f64_at(104),
            bin_to_physical_factor: f64_at(112),
            bin_to_physical_constant: f64_at(120),
        };
        Ok(InputBlock {
            header,
            next_input_addr: LittleEndian::read_u64(&bytes[24..32]),
            first_block_addr: LittleEndian::read_u64(&bytes[32..40]),
            attributes_addr: LittleEndian::read_u64(&bytes[40..48]),
            info,
            block_count: u32_at(76),
        })
    }
}
