use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use memmap2::Mmap;

use crate::error::{BdfError, Result};

/// Positional read access to container bytes, shareable between readers.
pub trait ByteSource: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

impl ByteSource for Mmap {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| BdfError::BlockLinkError(format!("offset {:#x} not addressable", offset)))?;
        let end = start.checked_add(buf.len()).filter(|&e| e <= self.len()).ok_or(
            BdfError::TooShortBuffer {
                actual:   self.len(),
                expected: start.saturating_add(buf.len()),
                file:     file!(),
                line:     line!(),
            },
        )?;
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

/// Reads through a plain file handle; used for the file still being written.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(FileSource { file: Mutex::new(File::open(path)?) })
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| BdfError::Faulted("file reader lock poisoned".into()))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}
