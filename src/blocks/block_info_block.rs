use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len};
use crate::error::Result;
use crate::types::{BlockInfo, DateTime};

/// BIBLOCK: directory entry of one recorded block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfoBlock {
    pub header: BlockHeader,
    pub next_block_addr: u64,
    pub data_list_addr: u64,
    pub envelope_addr: u64,
    pub block_index: u32,
    pub info: BlockInfo,
}

impl BlockInfoBlock {
    pub const SIZE: u64 = 144;
    pub const NEXT_LINK: u64 = 24;

    pub fn new(block_index: u32, info: BlockInfo) -> Self {
        BlockInfoBlock {
            header: BlockHeader::new("##BI", Self::SIZE, 3),
            next_block_addr: 0,
            data_list_addr: 0,
            envelope_addr: 0,
            block_index,
            info,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let i = &self.info;
        let mut buf = Vec::with_capacity(Self::SIZE as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.next_block_addr.to_le_bytes());
        buf.extend_from_slice(&self.data_list_addr.to_le_bytes());
        buf.extend_from_slice(&self.envelope_addr.to_le_bytes());
        buf.extend_from_slice(&self.block_index.to_le_bytes());
        buf.extend_from_slice(&i.reduction_factor.to_le_bytes());
        buf.extend_from_slice(&i.number_of_reductions.to_le_bytes());
        buf.extend_from_slice(&i.preferred_transfer_size.to_le_bytes());
        buf.extend_from_slice(&i.block_length.to_le_bytes());
        buf.push(i.external_timebase as u8);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&i.timebase_divisor.to_le_bytes());
        buf.extend_from_slice(&i.sample_rate_hertz.to_le_bytes());
        buf.extend_from_slice(&i.trigger_time_seconds.to_le_bytes());
        buf.extend_from_slice(&i.trigger_sample.to_le_bytes());
        buf.extend_from_slice(&i.stop_trigger_sample.to_le_bytes());
        buf.extend_from_slice(&i.start_time.to_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        debug_assert_eq!(buf.len() as u64, Self::SIZE);
        Ok(buf)
    }
}

impl BlockParse<'_> for BlockInfoBlock {
    const ID: &'static str = "##BI";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        ensure_len(bytes, Self::SIZE as usize)?;
        let info = BlockInfo {
            reduction_factor: LittleEndian::read_u32(&bytes[52..56]),
            number_of_reductions: LittleEndian::read_u32(&bytes[56..60]),
            preferred_transfer_size: LittleEndian::read_u32(&bytes[60..64]),
            block_length: LittleEndian::read_u64(&bytes[64..72]),
            external_timebase: bytes[72] != 0,
            timebase_divisor: LittleEndian::read_u32(&bytes[76..80]),
            sample_rate_hertz: LittleEndian::read_f64(&bytes[80..88]),
            trigger_time_seconds: LittleEndian::read_f64(&bytes[88..96]),
            trigger_sample: LittleEndian::read_u64(&bytes[96..104]),
            stop_trigger_sample: LittleEndian::read_u64(&bytes[104..112]),
            start_time: DateTime::from_bytes(&bytes[112..140])?,
        };
        Ok(BlockInfoBlock {
            header,
            next_block_addr: LittleEndian::read_u64(&bytes[24..32]),
            data_list_addr: LittleEndian::read_u64(&bytes[32..40]),
            envelope_addr: LittleEndian::read_u64(&bytes[40..48]),
            block_index: LittleEndian::read_u32(&bytes[48..52]),
            info,
        })
    }
}
