// Low level file and block handling for the container writer
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::blocks::common::BlockHeader;
use crate::blocks::data_block::DataBlock;
use crate::error::Result;
use crate::parsing::directory::Fragment;

/// Append-only block output with in-place patching of earlier fields.
#[derive(Debug)]
pub(crate) struct BlockSink {
    file: File,
    offset: u64,
}

impl BlockSink {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(BlockSink { file, offset: 0 })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn align(&mut self) -> Result<()> {
        let align = (8 - (self.offset % 8)) % 8;
        if align != 0 {
            let padding = [0u8; 8];
            self.file.write_all(&padding[..align as usize])?;
            self.offset += align;
        }
        Ok(())
    }

    /// Writes a block at the next 8 byte boundary and returns its address.
    pub fn write_block(&mut self, block_bytes: &[u8]) -> Result<u64> {
        self.align()?;
        let block_start = self.offset;
        self.file.write_all(block_bytes)?;
        self.offset += block_bytes.len() as u64;
        Ok(block_start)
    }

    /// Writes one `##DT` fragment and returns where its payload landed.
    pub fn write_data_block(&mut self, payload: &[u8]) -> Result<Fragment> {
        let header = DataBlock::header_for(payload.len()).to_bytes()?;
        let start = self.write_block(&header)?;
        self.file.write_all(payload)?;
        self.offset += payload.len() as u64;
        debug!(address = start, bytes = payload.len(), "wrote data fragment");
        Ok(Fragment { offset: start + BlockHeader::SIZE as u64, len: payload.len() as u64 })
    }

    /// Updates a link (u64 address) at a specific offset in the file.
    pub fn update_link(&mut self, offset: u64, address: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_u64::<LittleEndian>(address)?;
        self.file.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    pub fn update_u32(&mut self, offset: u64, value: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_u32::<LittleEndian>(value)?;
        self.file.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Reads back bytes that were already written.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        let read = self.file.read_exact(buf);
        self.file.seek(SeekFrom::Start(self.offset))?;
        read?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
