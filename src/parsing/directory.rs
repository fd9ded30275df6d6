//! In-memory directory of a container: groups, inputs and finalized blocks.
//!
//! The writer grows it as blocks are finalized, the parser rebuilds it from
//! the directory blocks of a finished file. Readers only ever see entries
//! stored here, so a block that is still streaming is never visible.

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeStore;
use crate::envelope::Envelope;
use crate::error::{BdfError, Result};
use crate::parsing::source::ByteSource;
use crate::types::{BlockInfo, DateTime, InputInfo, OperationMode};

/// Location of raw sample bytes in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// File offset of the first payload byte.
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub index: u32,
    pub info: BlockInfo,
    pub fragments: Vec<Fragment>,
    pub envelope: Envelope,
    pub data_list_addr: u64,
    pub envelope_addr: u64,
}

impl BlockEntry {
    /// Copy `buf.len()` bytes starting at byte `start` of the block payload.
    pub fn read_bytes(&self, source: &dyn ByteSource, start: u64, buf: &mut [u8]) -> Result<()> {
        let mut block_pos = 0u64;
        let mut filled = 0usize;
        for fragment in &self.fragments {
            if filled == buf.len() {
                break;
            }
            let frag_end = block_pos + fragment.len;
            let want = start + filled as u64;
            if want < frag_end {
                let in_frag = want - block_pos;
                let n = ((fragment.len - in_frag) as usize).min(buf.len() - filled);
                source.read_at(fragment.offset + in_frag, &mut buf[filled..filled + n])?;
                filled += n;
            }
            block_pos = frag_end;
        }
        if filled != buf.len() {
            return Err(BdfError::OutOfRange {
                what: "block payload bytes",
                requested: start + buf.len() as u64,
                available: block_pos,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InputEntry {
    pub info: InputInfo,
    pub attributes: AttributeStore,
    pub attributes_addr: u64,
    pub blocks: Vec<BlockEntry>,
}

impl InputEntry {
    pub fn new(info: InputInfo) -> Self {
        InputEntry { info, attributes: AttributeStore::new(), attributes_addr: 0, blocks: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub number: u32,
    pub mode: OperationMode,
    pub sample_rate: f64,
    pub timebase_divisor: u32,
    pub trigger_sample: u32,
    pub start_time: DateTime,
    pub inputs: Vec<InputEntry>,
}

impl GroupEntry {
    /// Position of the input registered as `(board, input)`.
    pub fn find_input(&self, board: u32, input: u32) -> Option<usize> {
        self.inputs
            .iter()
            .position(|i| i.info.board_number == board && i.info.input_number == input)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub groups: Vec<GroupEntry>,
}

impl Directory {
    pub fn group(&self, group: usize) -> Result<&GroupEntry> {
        self.groups
            .get(group)
            .ok_or_else(|| BdfError::UnknownGroup(group.to_string()))
    }

    pub fn input(&self, group: usize, input: usize) -> Result<&InputEntry> {
        self.group(group)?
            .inputs
            .get(input)
            .ok_or_else(|| BdfError::UnknownInput { group: group.to_string(), input: input.to_string() })
    }

    pub fn block(&self, group: usize, input: usize, block: usize) -> Result<&BlockEntry> {
        self.input(group, input)?
            .blocks
            .get(block)
            .ok_or(BdfError::UnknownBlock { group, input, block })
    }
}
