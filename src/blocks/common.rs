// blocks/common.rs
use byteorder::{ByteOrder, LittleEndian};

use crate::error::{BdfError, Result};

/// The 24 byte header shared by every block except the identification block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub id: String,
    pub reserved0: u32,
    pub block_len: u64,
    pub links_nr: u64,
}

impl BlockHeader {
    pub const SIZE: usize = 24;

    pub fn new(id: &str, block_len: u64, links_nr: u64) -> Self {
        BlockHeader { id: id.to_string(), reserved0: 0, block_len, links_nr }
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
        Ok(BlockHeader {
            id: String::from_utf8_lossy(&bytes[0..4]).into_owned(),
            reserved0: LittleEndian::read_u32(&bytes[4..8]),
            block_len: LittleEndian::read_u64(&bytes[8..16]),
            links_nr: LittleEndian::read_u64(&bytes[16..24]),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let id = self.id.as_bytes();
        if id.len() != 4 {
            return Err(BdfError::BlockSerializationError(format!(
                "block id must be 4 bytes, found {:?}",
                self.id
            )));
        }
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(id);
        buf.extend_from_slice(&self.reserved0.to_le_bytes());
        buf.extend_from_slice(&self.block_len.to_le_bytes());
        buf.extend_from_slice(&self.links_nr.to_le_bytes());
        Ok(buf)
    }
}

pub trait BlockParse<'a>: Sized {
    const ID: &'static str;

    fn from_bytes(bytes: &'a [u8]) -> Result<Self>;

    /// Parse the common header and check the block id.
    fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != Self::ID {
            return Err(BdfError::BlockIDError {
                actual: header.id,
                expected: Self::ID.to_string(),
            });
        }
        Ok(header)
    }
}

/// Zero bytes needed after `size` to reach 8 byte alignment.
#[inline]
pub const fn padding_to_align_8(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Bytes of the file starting at `address`.
pub fn slice_at(file: &[u8], address: u64) -> Result<&[u8]> {
    let start = usize::try_from(address)
        .map_err(|_| BdfError::BlockLinkError(format!("address {:#x} not addressable", address)))?;
    if start >= file.len() {
        return Err(BdfError::TooShortBuffer {
            actual:   file.len(),
            expected: start + BlockHeader::SIZE,
            file:     file!(),
            line:     line!(),
        });
    }
    Ok(&file[start..])
}

/// Check that a block body fits its slice.
pub fn ensure_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(BdfError::TooShortBuffer {
            actual:   bytes.len(),
            expected,
            file:     file!(),
            line:     line!(),
        });
    }
    Ok(())
}
