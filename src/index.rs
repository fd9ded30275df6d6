//! Container indexing.
//!
//! A [`ContainerIndex`] captures everything needed to locate and scale the
//! samples of a finished container: groups, inputs with their attributes,
//! block infos and the file ranges of every data fragment. It serializes to
//! JSON, so samples can later be read through any [`ByteRangeReader`]
//! without parsing the container again.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attributes::keys;
use crate::error::{BdfError, Result};
use crate::parsing::bdf_file::BdfFile;
use crate::parsing::directory::{Directory, Fragment};
use crate::types::{BlockInfo, DateTime, InputInfo, OperationMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedBlock {
    pub info: BlockInfo,
    /// Payload ranges in sample order.
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedInput {
    pub info: InputInfo,
    pub attributes: Vec<(String, String)>,
    pub blocks: Vec<IndexedBlock>,
}

impl IndexedInput {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute(keys::CHANNEL_NAME)
    }

    pub fn unit(&self) -> Option<&str> {
        self.attribute(keys::PHYSICAL_UNIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedGroup {
    pub number: u32,
    pub mode: OperationMode,
    pub sample_rate: f64,
    pub timebase_divisor: u32,
    pub trigger_sample: u32,
    pub start_time: DateTime,
    pub inputs: Vec<IndexedInput>,
}

/// Complete container index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerIndex {
    /// File size for validation
    pub file_size: u64,
    pub groups: Vec<IndexedGroup>,
}

/// Trait for reading byte ranges from different sources (files, HTTP, etc.)
pub trait ByteRangeReader {
    type Error;

    /// Read bytes from the specified range
    fn read_range(&mut self, offset: u64, length: u64) -> std::result::Result<Vec<u8>, Self::Error>;
}

/// Local file reader implementation
pub struct FileRangeReader {
    file: File,
}

impl FileRangeReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { file: File::open(path)? })
    }
}

impl ByteRangeReader for FileRangeReader {
    type Error = BdfError;

    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; length as usize];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl ContainerIndex {
    /// Create an index from a finished container file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = BdfFile::parse_from_file(path)?;
        Ok(Self::from_directory(&file.directory, file.mmap.len() as u64))
    }

    pub fn from_directory(directory: &Directory, file_size: u64) -> Self {
        let groups = directory
            .groups
            .iter()
            .map(|g| IndexedGroup {
                number: g.number,
                mode: g.mode,
                sample_rate: g.sample_rate,
                timebase_divisor: g.timebase_divisor,
                trigger_sample: g.trigger_sample,
                start_time: g.start_time,
                inputs: g
                    .inputs
                    .iter()
                    .map(|i| IndexedInput {
                        info: i.info,
                        attributes: i.attributes.entries().to_vec(),
                        blocks: i
                            .blocks
                            .iter()
                            .map(|b| IndexedBlock { info: b.info, fragments: b.fragments.clone() })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        ContainerIndex { file_size, groups }
    }

    /// Save the index to a JSON file
    pub fn save_to_file(&self, index_path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            BdfError::BlockSerializationError(format!("JSON serialization failed: {}", e))
        })?;
        std::fs::write(index_path, json)?;
        Ok(())
    }

    /// Load an index from a JSON file
    pub fn load_from_file(index_path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(index_path)?;
        serde_json::from_str(&json).map_err(|e| {
            BdfError::BlockSerializationError(format!("JSON deserialization failed: {}", e))
        })
    }

    pub fn input(&self, group: usize, input: usize) -> Result<&IndexedInput> {
        self.groups
            .get(group)
            .ok_or_else(|| BdfError::UnknownGroup(group.to_string()))?
            .inputs
            .get(input)
            .ok_or_else(|| BdfError::UnknownInput { group: group.to_string(), input: input.to_string() })
    }

    fn block(&self, group: usize, input: usize, block: usize) -> Result<(&IndexedInput, &IndexedBlock)> {
        let entry = self.input(group, input)?;
        let b = entry
            .blocks
            .get(block)
            .ok_or(BdfError::UnknownBlock { group, input, block })?;
        Ok((entry, b))
    }

    /// Find the first input whose channel name attribute equals `name`.
    pub fn find_input_by_name(&self, name: &str) -> Option<(usize, usize)> {
        for (g, group) in self.groups.iter().enumerate() {
            for (i, input) in group.inputs.iter().enumerate() {
                if input.name() == Some(name) {
                    return Some((g, i));
                }
            }
        }
        None
    }

    /// File ranges `(offset, length)` holding samples `[address, address + count)`.
    pub fn byte_ranges(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        count: u64,
    ) -> Result<Vec<(u64, u64)>> {
        let (entry, b) = self.block(group, input, block)?;
        let end = address.saturating_add(count);
        if end > b.info.block_length {
            return Err(BdfError::OutOfRange {
                what: "sample address",
                requested: end,
                available: b.info.block_length,
            });
        }
        let bps = entry.info.bytes_per_sample as u64;
        let (mut start, stop) = (address * bps, end * bps);
        let mut ranges = Vec::new();
        let mut block_pos = 0u64;
        for fragment in &b.fragments {
            let frag_end = block_pos + fragment.len;
            if start < stop && start < frag_end {
                let take = frag_end.min(stop) - start;
                ranges.push((fragment.offset + (start - block_pos), take));
                start += take;
            }
            block_pos = frag_end;
        }
        Ok(ranges)
    }

    /// Read sign extended raw words through a byte range reader.
    pub fn read_raw_l<R: ByteRangeReader<Error = BdfError>>(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        count: u64,
        reader: &mut R,
    ) -> Result<Vec<i32>> {
        let entry = self.input(group, input)?;
        let layout = entry.info.layout();
        let bps = layout.bytes_per_sample() as usize;
        if !matches!(bps, 1 | 2 | 4) {
            return Err(BdfError::BlockSerializationError(format!(
                "indexed input stores {} bytes per sample",
                bps
            )));
        }
        let mut bytes = Vec::with_capacity(count as usize * bps);
        for (offset, len) in self.byte_ranges(group, input, block, address, count)? {
            bytes.extend_from_slice(&reader.read_range(offset, len)?);
        }
        Ok(bytes.chunks_exact(bps).map(|w| layout.decode_word(w)).collect())
    }

    /// Read physical values through a byte range reader.
    pub fn read_data_d<R: ByteRangeReader<Error = BdfError>>(
        &self,
        group: usize,
        input: usize,
        block: usize,
        address: u64,
        count: u64,
        reader: &mut R,
    ) -> Result<Vec<f64>> {
        let info = self.input(group, input)?.info;
        let (layout, scaling) = (info.layout(), info.scaling());
        let words = self.read_raw_l(group, input, block, address, count, reader)?;
        Ok(words.into_iter().map(|w| scaling.physical(layout.analog(w))).collect())
    }
}
