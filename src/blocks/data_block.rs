use crate::blocks::common::{BlockHeader, BlockParse, ensure_len};
use crate::error::Result;

/// DTBLOCK: one contiguous fragment of raw sample bytes.
#[derive(Debug)]
pub struct DataBlock<'a> {
    pub header: BlockHeader,
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for DataBlock<'a> {
    const ID: &'static str = "##DT";
    fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        let data_len = (header.block_len as usize).saturating_sub(BlockHeader::SIZE);
        ensure_len(bytes, BlockHeader::SIZE + data_len)?;
        let data = &bytes[BlockHeader::SIZE..BlockHeader::SIZE + data_len];
        Ok(Self { header, data })
    }
}

impl DataBlock<'_> {
    /// Header bytes for a fragment holding `payload_len` bytes.
    pub fn header_for(payload_len: usize) -> BlockHeader {
        BlockHeader::new("##DT", (BlockHeader::SIZE + payload_len) as u64, 0)
    }
}
