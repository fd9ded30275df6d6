use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{BlockHeader, BlockParse, ensure_len, padding_to_align_8};
use crate::envelope::Envelope;
use crate::error::{BdfError, Result};

/// EVBLOCK: reduction curves of one block.
///
/// Body: reduction factor u32, level count u32, then per level a pair count
/// u64 followed by `(min i32, max i32)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeBlock {
    pub header: BlockHeader,
    pub envelope: Envelope,
}

impl EnvelopeBlock {
    pub fn new(envelope: Envelope) -> Self {
        let body: usize = 8 + envelope.levels.iter().map(|l| 8 + l.len() * 8).sum::<usize>();
        let len = BlockHeader::SIZE + body;
        EnvelopeBlock {
            header: BlockHeader::new("##EV", (len + padding_to_align_8(len)) as u64, 0),
            envelope,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.header.block_len as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.envelope.reduction_factor.to_le_bytes());
        buf.extend_from_slice(&(self.envelope.levels.len() as u32).to_le_bytes());
        for level in &self.envelope.levels {
            buf.extend_from_slice(&(level.len() as u64).to_le_bytes());
            for (min, max) in level {
                buf.extend_from_slice(&min.to_le_bytes());
                buf.extend_from_slice(&max.to_le_bytes());
            }
        }
        buf.resize(buf.len() + padding_to_align_8(buf.len()), 0);
        if buf.len() as u64 != self.header.block_len {
            return Err(BdfError::BlockSerializationError(format!(
                "EnvelopeBlock length mismatch: header {} vs actual {}",
                self.header.block_len,
                buf.len()
            )));
        }
        Ok(buf)
    }
}

impl BlockParse<'_> for EnvelopeBlock {
    const ID: &'static str = "##EV";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        ensure_len(bytes, header.block_len as usize)?;
        let body = &bytes[..header.block_len as usize];
        ensure_len(body, BlockHeader::SIZE + 8)?;

        let reduction_factor = LittleEndian::read_u32(&body[24..28]);
        let level_count = LittleEndian::read_u32(&body[28..32]) as usize;
        if level_count > 0 && reduction_factor < 2 {
            return Err(BdfError::BlockSerializationError(format!(
                "envelope with {} levels has reduction factor {}",
                level_count, reduction_factor
            )));
        }
        let mut off = 32;
        let mut levels = Vec::with_capacity(level_count.min(64));
        for _ in 0..level_count {
            ensure_len(body, off + 8)?;
            let pairs = LittleEndian::read_u64(&body[off..off + 8]) as usize;
            off += 8;
            ensure_len(body, off.saturating_add(pairs.saturating_mul(8)))?;
            let level: Vec<(i32, i32)> = body[off..off + pairs * 8]
                .chunks_exact(8)
                .map(|c| (LittleEndian::read_i32(&c[0..4]), LittleEndian::read_i32(&c[4..8])))
                .collect();
            off += pairs * 8;
            levels.push(level);
        }
        Ok(EnvelopeBlock { header, envelope: Envelope { reduction_factor, levels } })
    }
}
