use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::attributes::AttributeStore;
use crate::blocks::{
    attribute_block::AttributeBlock,
    block_info_block::BlockInfoBlock,
    common::{BlockParse, slice_at},
    data_block::DataBlock,
    data_list_block::DataListBlock,
    envelope_block::EnvelopeBlock,
    group_block::GroupBlock,
    header_block::HeaderBlock,
    identification_block::IdentificationBlock,
    input_block::InputBlock,
};
use crate::envelope::Envelope;
use crate::error::{BdfError, Result};
use crate::parsing::directory::{BlockEntry, Directory, Fragment, GroupEntry, InputEntry};
use crate::scaling::SampleLayout;

#[derive(Debug)]
pub struct BdfFile {
    pub path: PathBuf,
    pub identification: IdentificationBlock,
    pub header: HeaderBlock,
    pub directory: Directory,
    pub mmap: Mmap, // Keep the mmap alive for all reads against this file.
}

impl BdfFile {
    /// Parse a finished container and its whole directory.
    ///
    /// # Returns
    /// The parsed file, [`BdfError::IncompleteContainer`] for a file that was
    /// never closed, or a decoding error for malformed content.
    pub fn parse_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let identification = IdentificationBlock::from_bytes(&mmap)?;
        let header_pos = IdentificationBlock::SIZE as u64;
        let header = HeaderBlock::from_bytes(slice_at(&mmap, header_pos)?)?;
        if !header.is_finalized() {
            return Err(BdfError::IncompleteContainer(path.to_path_buf()));
        }

        let mut groups = Vec::new();
        let mut gr_addr = header.first_group_addr;
        let mut prev = header_pos;
        while gr_addr != 0 {
            check_forward(prev, gr_addr, "group")?;
            let gr = GroupBlock::from_bytes(slice_at(&mmap, gr_addr)?)?;
            let inputs = parse_inputs(&mmap, gr_addr, gr.first_input_addr)?;
            if inputs.len() != gr.input_count as usize {
                return Err(BdfError::BlockLinkError(format!(
                    "group {} declares {} inputs, found {}",
                    gr.group_number,
                    gr.input_count,
                    inputs.len()
                )));
            }
            groups.push(GroupEntry {
                number: gr.group_number,
                mode: gr.mode,
                sample_rate: gr.sample_rate,
                timebase_divisor: gr.timebase_divisor,
                trigger_sample: gr.trigger_sample,
                start_time: gr.start_time,
                inputs,
            });
            prev = gr_addr;
            gr_addr = gr.next_group_addr;
        }
        if groups.len() != header.group_count as usize {
            return Err(BdfError::BlockLinkError(format!(
                "header declares {} groups, found {}",
                header.group_count,
                groups.len()
            )));
        }

        info!(path = %path.display(), groups = groups.len(), "loaded container");
        Ok(BdfFile {
            path: path.to_path_buf(),
            identification,
            header,
            directory: Directory { groups },
            mmap,
        })
    }
}

/// Directory links always point forward; anything else is a corrupt or cyclic chain.
fn check_forward(prev: u64, next: u64, what: &str) -> Result<()> {
    if next <= prev {
        return Err(BdfError::BlockLinkError(format!(
            "{} link {:#x} does not follow {:#x}",
            what, next, prev
        )));
    }
    Ok(())
}

fn parse_inputs(mmap: &[u8], group_addr: u64, first: u64) -> Result<Vec<InputEntry>> {
    let mut inputs = Vec::new();
    let mut addr = first;
    let mut prev = group_addr;
    while addr != 0 {
        check_forward(prev, addr, "input")?;
        let ib = InputBlock::from_bytes(slice_at(mmap, addr)?)?;
        check_layout(&ib)?;
        let attributes = if ib.attributes_addr != 0 {
            let at = AttributeBlock::from_bytes(slice_at(mmap, ib.attributes_addr)?)?;
            AttributeStore::sealed_from(at.entries)
        } else {
            let mut store = AttributeStore::new();
            store.seal();
            store
        };
        let blocks = parse_blocks(mmap, addr, &ib)?;
        inputs.push(InputEntry {
            info: ib.info,
            attributes,
            attributes_addr: ib.attributes_addr,
            blocks,
        });
        prev = addr;
        addr = ib.next_input_addr;
    }
    Ok(inputs)
}

/// The stored word width must be the one the masks imply.
fn check_layout(ib: &InputBlock) -> Result<()> {
    let info = &ib.info;
    let layout = SampleLayout::new(info.analog_mask, info.marker_mask).map_err(|e| {
        BdfError::BlockSerializationError(format!(
            "input {}/{} has invalid masks: {}",
            info.board_number, info.input_number, e
        ))
    })?;
    if layout.bytes_per_sample() != info.bytes_per_sample {
        return Err(BdfError::BlockSerializationError(format!(
            "input {}/{} stores {} bytes per sample, masks need {}",
            info.board_number,
            info.input_number,
            info.bytes_per_sample,
            layout.bytes_per_sample()
        )));
    }
    Ok(())
}

fn parse_blocks(mmap: &[u8], input_addr: u64, ib: &InputBlock) -> Result<Vec<BlockEntry>> {
    let mut blocks = Vec::with_capacity(ib.block_count as usize);
    let mut addr = ib.first_block_addr;
    let mut prev = input_addr;
    while addr != 0 {
        check_forward(prev, addr, "block")?;
        let bi = BlockInfoBlock::from_bytes(slice_at(mmap, addr)?)?;
        if bi.block_index as usize != blocks.len() {
            return Err(BdfError::BlockLinkError(format!(
                "block index {} found at position {}",
                bi.block_index,
                blocks.len()
            )));
        }
        let fragments = parse_fragments(mmap, bi.data_list_addr)?;
        let stored: u64 = fragments.iter().map(|f| f.len).sum();
        let needed = bi.info.block_length.saturating_mul(ib.info.bytes_per_sample as u64);
        if stored < needed {
            return Err(BdfError::OutOfRange {
                what: "stored block bytes",
                requested: needed,
                available: stored,
            });
        }
        let envelope = if bi.envelope_addr != 0 {
            EnvelopeBlock::from_bytes(slice_at(mmap, bi.envelope_addr)?)?.envelope
        } else {
            Envelope::empty(bi.info.reduction_factor)
        };
        if envelope.number_of_reductions() != bi.info.number_of_reductions
            || (!envelope.levels.is_empty()
                && envelope.reduction_factor != bi.info.reduction_factor)
        {
            return Err(BdfError::BlockSerializationError(format!(
                "block {} envelope ({} levels, factor {}) does not match its info ({} levels, factor {})",
                bi.block_index,
                envelope.number_of_reductions(),
                envelope.reduction_factor,
                bi.info.number_of_reductions,
                bi.info.reduction_factor
            )));
        }
        debug!(
            input = ib.info.input_number,
            block = bi.block_index,
            fragments = fragments.len(),
            "parsed block"
        );
        blocks.push(BlockEntry {
            index: bi.block_index,
            info: bi.info,
            fragments,
            envelope,
            data_list_addr: bi.data_list_addr,
            envelope_addr: bi.envelope_addr,
        });
        prev = addr;
        addr = bi.next_block_addr;
    }
    if blocks.len() != ib.block_count as usize {
        return Err(BdfError::BlockLinkError(format!(
            "input declares {} blocks, found {}",
            ib.block_count,
            blocks.len()
        )));
    }
    Ok(blocks)
}

fn parse_fragments(mmap: &[u8], dl_addr: u64) -> Result<Vec<Fragment>> {
    let mut fragments = Vec::new();
    let mut addr = dl_addr;
    while addr != 0 {
        let dl = DataListBlock::from_bytes(slice_at(mmap, addr)?)?;
        for &link in &dl.data_links {
            let dt = DataBlock::from_bytes(slice_at(mmap, link)?)?;
            fragments.push(Fragment {
                offset: link + crate::blocks::common::BlockHeader::SIZE as u64,
                len: dt.data.len() as u64,
            });
        }
        if dl.next != 0 {
            check_forward(addr, dl.next, "data list")?;
        }
        addr = dl.next;
    }
    Ok(fragments)
}
