use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len, padding_to_align_8};
use crate::error::{BdfError, Result};

/// ATBLOCK: key/value attributes of one input.
///
/// Body: entry count u32, reserved u32, then per entry key length u32,
/// value length u32, key bytes, value bytes (UTF-8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBlock {
    pub header: BlockHeader,
    pub entries: Vec<(String, String)>,
}

impl AttributeBlock {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        let body: usize = 8 + entries.iter().map(|(k, v)| 8 + k.len() + v.len()).sum::<usize>();
        let len = BlockHeader::SIZE + body;
        AttributeBlock {
            header: BlockHeader::new("##AT", (len + padding_to_align_8(len)) as u64, 0),
            entries,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.header.block_len as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        for (key, value) in &self.entries {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
        buf.resize(buf.len() + padding_to_align_8(buf.len()), 0);
        if buf.len() as u64 != self.header.block_len {
            return Err(BdfError::BlockSerializationError(format!(
                "AttributeBlock length mismatch: header {} vs actual {}",
                self.header.block_len,
                buf.len()
            )));
        }
        Ok(buf)
    }
}

impl BlockParse<'_> for AttributeBlock {
    const ID: &'static str = "##AT";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        ensure_len(bytes, header.block_len as usize)?;
        let body = &bytes[..header.block_len as usize];
        ensure_len(body, BlockHeader::SIZE + 8)?;

        let count = LittleEndian::read_u32(&body[24..28]) as usize;
        let mut off = 32;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ensure_len(body, off + 8)?;
            let key_len = LittleEndian::read_u32(&body[off..off + 4]) as usize;
            let value_len = LittleEndian::read_u32(&body[off + 4..off + 8]) as usize;
            off += 8;
            ensure_len(body, off.saturating_add(key_len).saturating_add(value_len))?;
            let key = utf8(&body[off..off + key_len])?;
            off += key_len;
            let value = utf8(&body[off..off + value_len])?;
            off += value_len;
            entries.push((key, value));
        }
        Ok(AttributeBlock { header, entries })
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| BdfError::BlockSerializationError(format!("attribute is not UTF-8: {}", e)))
}
