use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::ensure_len;
use crate::error::{BdfError, Result};

pub const FILE_ID: &str = "BDF     ";
pub const FORMAT_VERSION: u16 = 100;

/// The fixed 64 byte block at offset 0. It has no common block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationBlock {
    pub file_identifier: String,
    pub version_identifier: String,
    pub program_identifier: String,
    pub version_number: u16,
}

impl Default for IdentificationBlock {
    fn default() -> Self {
        IdentificationBlock {
            file_identifier: FILE_ID.to_string(),
            version_identifier: "1.00    ".to_string(),
            program_identifier: "bdf-rs  ".to_string(),
            version_number: FORMAT_VERSION,
        }
    }
}

impl IdentificationBlock {
    pub const SIZE: usize = 64;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, Self::SIZE)?;
        let file_identifier = String::from_utf8_lossy(&bytes[0..8]).into_owned();
        if file_identifier != FILE_ID {
            return Err(BdfError::FileIdentifierError(file_identifier));
        }
        let version_number = LittleEndian::read_u16(&bytes[28..30]);
        if version_number / 100 != FORMAT_VERSION / 100 {
            return Err(BdfError::FileVersioningError(version_number.to_string()));
        }
        Ok(IdentificationBlock {
            file_identifier,
            version_identifier: String::from_utf8_lossy(&bytes[8..16]).into_owned(),
            program_identifier: String::from_utf8_lossy(&bytes[16..24]).into_owned(),
            version_number,
        })
    }

    /// Layout: file id (8), version string (8), program id (8), reserved (4),
    /// version number (2), reserved (34).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; Self::SIZE];
        for (range, text) in [
            (0..8, &self.file_identifier),
            (8..16, &self.version_identifier),
            (16..24, &self.program_identifier),
        ] {
            if text.len() != 8 {
                return Err(BdfError::BlockSerializationError(format!(
                    "identification field {:?} must be 8 bytes",
                    text
                )));
            }
            buf[range].copy_from_slice(text.as_bytes());
        }
        LittleEndian::write_u16(&mut buf[28..30], self.version_number);
        Ok(buf)
    }
}
