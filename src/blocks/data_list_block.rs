use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len};
use crate::error::{BdfError, Result};

/// DLBLOCK: ordered list of the data fragments of one block.
///
/// Link 0 chains to a continuation list (0 when this is the last one), the
/// remaining links address `##DT` fragments in sample order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataListBlock {
    pub header: BlockHeader,
    pub next: u64,
    pub data_links: Vec<u64>,
}

impl DataListBlock {
    pub fn new(data_links: Vec<u64>) -> Self {
        let links = data_links.len() as u64 + 1;
        DataListBlock {
            header: BlockHeader::new("##DL", BlockHeader::SIZE as u64 + links * 8, links),
            next: 0,
            data_links,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let expected = self.data_links.len() as u64 + 1;
        if self.header.links_nr != expected {
            return Err(BdfError::BlockSerializationError(format!(
                "data list declares {} links but holds {}",
                self.header.links_nr, expected
            )));
        }
        let mut buf = self.header.to_bytes()?;
        buf.reserve(expected as usize * 8);
        for link in std::iter::once(&self.next).chain(&self.data_links) {
            buf.extend_from_slice(&link.to_le_bytes());
        }
        Ok(buf)
    }
}

impl BlockParse<'_> for DataListBlock {
    const ID: &'static str = "##DL";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let links = usize::try_from(header.links_nr)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                BdfError::BlockSerializationError(format!(
                    "data list with {} links",
                    header.links_nr
                ))
            })?;
        let end = links.saturating_mul(8).saturating_add(BlockHeader::SIZE);
        ensure_len(bytes, end)?;
        let mut words = bytes[BlockHeader::SIZE..end]
            .chunks_exact(8)
            .map(LittleEndian::read_u64);
        let next = words.next().unwrap_or(0);
        Ok(DataListBlock { header, next, data_links: words.collect() })
    }
}
