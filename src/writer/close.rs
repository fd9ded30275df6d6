// Closing groups, writing the directory and promoting the finished file
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::FileWriter;
use crate::blocks::block_info_block::BlockInfoBlock;
use crate::blocks::group_block::GroupBlock;
use crate::blocks::header_block::{FLAG_FINALIZED, HeaderBlock};
use crate::blocks::input_block::InputBlock;
use crate::error::{BdfError, Result};
use crate::handle::GroupHandle;

impl FileWriter {
    /// Close one group. Open streams are finalized with every whole sample
    /// written so far. Returns `true` when this was the last open group.
    pub fn close_group(&mut self, group: GroupHandle) -> Result<bool> {
        let group = self.resolve_group(group)?;
        let result = self.close_group_inner(group);
        let result = self.latch(result);
        // The handle is released even if finalizing failed; the fault latch keeps the temp file.
        self.groups.remove(group);
        result?;
        Ok(self.groups.is_empty())
    }

    fn close_group_inner(&mut self, group: GroupHandle) -> Result<()> {
        let open: Vec<_> = self
            .group_state(group)?
            .inputs
            .iter()
            .filter_map(|i| i.open_stream)
            .collect();
        for streamer in open {
            let Some(stream) = self.streams.get(streamer) else { continue };
            let bps = stream.layout.bytes_per_sample() as u64;
            let whole = stream.written / bps * bps;
            warn!(%streamer, block = stream.block, bytes = whole, "finalizing open stream on close");
            self.finalize_stream(streamer, 0, whole)?;
        }
        if !self.group_state(group)?.attributes_sealed {
            self.flush_attributes(group)?;
        }

        let index = self.group_state(group)?.index;
        let entry = &self.directory.groups[index];
        if !entry.mode.independent_inputs() {
            let counts: Vec<usize> = entry.inputs.iter().map(|i| i.blocks.len()).collect();
            if counts.windows(2).any(|w| w[0] != w[1]) {
                warn!(group = entry.number, ?counts, "inputs recorded different numbers of blocks");
            }
        }
        info!(group = entry.number, inputs = entry.inputs.len(), "closed group");
        Ok(())
    }

    /// Close every open group, write the directory and promote the file.
    ///
    /// On any failure the temporary file is kept and the error is returned.
    pub fn finish(mut self) -> Result<()> {
        let mut first_error = None;
        for handle in self.groups.keys() {
            if let Err(e) = self.close_group(handle) {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        self.check_fault()?;
        let result = self.write_directory();
        self.latch(result)?;
        self.promote()
    }

    /// Append `##GR`/`##IN`/`##BI` chains and patch the header.
    fn write_directory(&mut self) -> Result<()> {
        let mut prev_group: Option<u64> = None;
        let groups = std::mem::take(&mut self.directory.groups);
        for entry in &groups {
            let mut gr = GroupBlock::new(entry.number, entry.mode);
            gr.input_count = entry.inputs.len() as u32;
            gr.trigger_sample = entry.trigger_sample;
            gr.timebase_divisor = entry.timebase_divisor;
            gr.sample_rate = entry.sample_rate;
            gr.start_time = entry.start_time;
            let gr_pos = self.sink.write_block(&gr.to_bytes()?)?;
            match prev_group {
                Some(prev) => self.sink.update_link(prev + GroupBlock::NEXT_LINK, gr_pos)?,
                None => self
                    .sink
                    .update_link(self.header_pos + HeaderBlock::FIRST_GROUP_LINK, gr_pos)?,
            }
            prev_group = Some(gr_pos);

            let mut prev_input: Option<u64> = None;
            for input in &entry.inputs {
                let mut ib = InputBlock::new(input.info);
                ib.attributes_addr = input.attributes_addr;
                ib.block_count = input.blocks.len() as u32;
                let in_pos = self.sink.write_block(&ib.to_bytes()?)?;
                match prev_input {
                    Some(prev) => self.sink.update_link(prev + InputBlock::NEXT_LINK, in_pos)?,
                    None => self.sink.update_link(gr_pos + GroupBlock::FIRST_INPUT_LINK, in_pos)?,
                }
                prev_input = Some(in_pos);

                let mut prev_block: Option<u64> = None;
                for block in &input.blocks {
                    let mut bi = BlockInfoBlock::new(block.index, block.info);
                    bi.data_list_addr = block.data_list_addr;
                    bi.envelope_addr = block.envelope_addr;
                    let bi_pos = self.sink.write_block(&bi.to_bytes()?)?;
                    match prev_block {
                        Some(prev) => self.sink.update_link(prev + BlockInfoBlock::NEXT_LINK, bi_pos)?,
                        None => self.sink.update_link(in_pos + InputBlock::FIRST_BLOCK_LINK, bi_pos)?,
                    }
                    prev_block = Some(bi_pos);
                }
            }
        }
        let count = groups.len() as u32;
        self.directory.groups = groups;
        self.sink.update_u32(self.header_pos + HeaderBlock::GROUP_COUNT_FIELD, count)?;
        self.sink.update_u32(self.header_pos + HeaderBlock::FLAGS_FIELD, FLAG_FINALIZED)?;
        Ok(())
    }

    fn promote(mut self) -> Result<()> {
        let sync = self.options.sync_on_close;
        if sync {
            self.sink.sync()?;
        }
        let temp = self.temp_path.clone();
        let target = self.final_path.clone();
        drop(self);
        fs::rename(&temp, &target)
            .map_err(|source| BdfError::PromotionFailed { temp: temp.clone(), source })?;
        if sync {
            sync_parent_dir(&target)?;
        }
        info!(path = %target.display(), "promoted container");
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
