use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len};
use crate::error::Result;

/// Flag bit set once the directory has been written and linked.
pub const FLAG_FINALIZED: u32 = 1;

/// HDBLOCK: root of the group directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    pub first_group_addr: u64,
    pub group_count: u32,
    pub flags: u32,
}

impl HeaderBlock {
    pub const SIZE: u64 = 48;
    /// Offset of `first_group_addr` inside the block.
    pub const FIRST_GROUP_LINK: u64 = 24;
    pub const GROUP_COUNT_FIELD: u64 = 32;
    pub const FLAGS_FIELD: u64 = 36;

    pub fn is_finalized(&self) -> bool {
        self.flags & FLAG_FINALIZED != 0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.first_group_addr.to_le_bytes());
        buf.extend_from_slice(&self.group_count.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        debug_assert_eq!(buf.len() as u64, Self::SIZE);
        Ok(buf)
    }
}

impl Default for HeaderBlock {
    fn default() -> Self {
        HeaderBlock {
            header: BlockHeader::new("##HD", Self::SIZE, 1),
            first_group_addr: 0,
            group_count: 0,
            flags: 0,
        }
    }
}

impl BlockParse<'_> for HeaderBlock {
    const ID: &'static str = "##HD";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        ensure_len(bytes, Self::SIZE as usize)?;
        Ok(HeaderBlock {
            header,
            first_group_addr: LittleEndian::read_u64(&bytes[24..32]),
            group_count: LittleEndian::read_u32(&bytes[32..36]),
            flags: LittleEndian::read_u32(&bytes[36..40]),
        })
    }
}
