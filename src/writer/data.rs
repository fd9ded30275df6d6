// Streaming of block data: fragments, envelopes and end-of-record handling
use tracing::debug;

use super::FileWriter;
use crate::blocks::common::BlockHeader;
use crate::blocks::data_list_block::DataListBlock;
use crate::blocks::envelope_block::EnvelopeBlock;
use crate::envelope::{Envelope, EnvelopeBuilder};
use crate::error::{BdfError, Result};
use crate::handle::{GroupHandle, StreamerHandle};
use crate::parsing::directory::{BlockEntry, Fragment};
use crate::scaling::SampleLayout;
use crate::types::BlockInfo;

/// A block in the streaming state.
#[derive(Debug)]
pub(super) struct OpenStream {
    pub(super) group: GroupHandle,
    pub(super) input: usize,
    pub(super) block: u32,
    pub(super) layout: SampleLayout,
    /// Bytes not yet written as a fragment.
    pub(super) pending: Vec<u8>,
    /// Tail of a sample word split across `write_data` calls.
    pub(super) carry: Vec<u8>,
    pub(super) fragments: Vec<Fragment>,
    pub(super) written: u64,
    pub(super) envelope: EnvelopeBuilder,
}

impl OpenStream {
    fn feed_envelope(&mut self, data: &[u8]) {
        let bps = self.layout.bytes_per_sample() as usize;
        let mut data = data;
        if !self.carry.is_empty() {
            let need = bps - self.carry.len();
            let take = need.min(data.len());
            self.carry.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.carry.len() < bps {
                return;
            }
            let word = self.layout.decode_word(&self.carry);
            self.envelope.push(self.layout.analog(word));
            self.carry.clear();
        }
        let mut words = data.chunks_exact(bps);
        for word in &mut words {
            let word = self.layout.decode_word(word);
            self.envelope.push(self.layout.analog(word));
        }
        self.carry.extend_from_slice(words.remainder());
    }
}

impl FileWriter {
    /// Fragment payload size: `transfer_size` rounded down to whole samples.
    fn fragment_len(&self, layout: &SampleLayout) -> usize {
        let bps = layout.bytes_per_sample() as usize;
        (self.options.transfer_size / bps * bps).max(bps)
    }

    /// Open block `block_nr` of input `(board, input)` for streaming.
    pub fn init_input_streamer(
        &mut self,
        board: u32,
        input: u32,
        block_nr: u32,
        group: GroupHandle,
    ) -> Result<StreamerHandle> {
        self.check_fault()?;
        let group = self.resolve_group(group)?;
        let index = self.group_state(group)?.index;
        let pos = self.directory.groups[index].find_input(board, input).ok_or_else(|| {
            BdfError::UnknownInput { group: group.to_string(), input: format!("{}/{}", board, input) }
        })?;
        let layout = self.directory.groups[index].inputs[pos].info.layout();
        let state = &self.group_state(group)?.inputs[pos];
        if state.open_stream.is_some() {
            return Err(BdfError::InvalidArgument(format!(
                "input {}/{} is already streaming",
                board, input
            )));
        }
        if block_nr != state.next_block {
            return Err(BdfError::InvalidArgument(format!(
                "input {}/{} expects block {}, got {}",
                board, input, state.next_block, block_nr
            )));
        }
        let stream = OpenStream {
            group,
            input: pos,
            block: block_nr,
            layout,
            pending: Vec::new(),
            carry: Vec::new(),
            fragments: Vec::new(),
            written: 0,
            envelope: EnvelopeBuilder::new(self.options.reduction_factor, self.options.max_reductions),
        };
        let handle = self.streams.insert(stream);
        let state = &mut self.group_state_mut(group)?.inputs[pos];
        state.open_stream = Some(handle);
        state.streamed = true;
        debug!(board, input, block = block_nr, %handle, "opened stream");
        Ok(handle)
    }

    /// Append raw bytes to a streaming block.
    pub fn write_data(&mut self, streamer: StreamerHandle, data: &[u8], group: GroupHandle) -> Result<()> {
        self.check_fault()?;
        let owner = self
            .streams
            .get(streamer)
            .map(|s| s.group)
            .ok_or_else(|| BdfError::NotStreaming(streamer.to_string()))?;
        if !group.is_default() && group != owner {
            return Err(BdfError::InvalidArgument(format!(
                "stream {} does not belong to group {}",
                streamer, group
            )));
        }
        let result = self.append(streamer, data);
        self.latch(result)
    }

    fn append(&mut self, streamer: StreamerHandle, data: &[u8]) -> Result<()> {
        let chunk = {
            let stream = self
                .streams
                .get_mut(streamer)
                .ok_or_else(|| BdfError::NotStreaming(streamer.to_string()))?;
            stream.feed_envelope(data);
            stream.pending.extend_from_slice(data);
            stream.written += data.len() as u64;
            stream.layout
        };
        let chunk = self.fragment_len(&chunk);
        loop {
            let payload = match self.streams.get_mut(streamer) {
                Some(stream) if stream.pending.len() >= chunk => {
                    stream.pending.drain(..chunk).collect::<Vec<u8>>()
                }
                _ => break,
            };
            let fragment = self.sink.write_data_block(&payload)?;
            if let Some(stream) = self.streams.get_mut(streamer) {
                stream.fragments.push(fragment);
            }
        }
        Ok(())
    }

    /// Finalize block `block_nr` of input `(board, input)` with `data_count` bytes.
    pub fn write_eor_info(
        &mut self,
        block_nr: u32,
        trigger_time_ps: u64,
        data_count: u64,
        input: u32,
        board: u32,
        group: GroupHandle,
    ) -> Result<()> {
        self.check_fault()?;
        let group = self.resolve_group(group)?;
        let index = self.group_state(group)?.index;
        let pos = self.directory.groups[index].find_input(board, input).ok_or_else(|| {
            BdfError::UnknownInput { group: group.to_string(), input: format!("{}/{}", board, input) }
        })?;
        let streamer = self.group_state(group)?.inputs[pos]
            .open_stream
            .ok_or_else(|| BdfError::NotStreaming(format!("input {}/{}", board, input)))?;
        let stream = self
            .streams
            .get(streamer)
            .ok_or_else(|| BdfError::NotStreaming(streamer.to_string()))?;
        if stream.block != block_nr {
            return Err(BdfError::InvalidArgument(format!(
                "input {}/{} is streaming block {}, got {}",
                board, input, stream.block, block_nr
            )));
        }
        if data_count > stream.written {
            return Err(BdfError::OutOfRange {
                what: "data count",
                requested: data_count,
                available: stream.written,
            });
        }
        let bps = stream.layout.bytes_per_sample() as u64;
        if data_count % bps != 0 {
            return Err(BdfError::InvalidArgument(format!(
                "data count {} is not a multiple of {} bytes per sample",
                data_count, bps
            )));
        }
        let result = self.finalize_stream(streamer, trigger_time_ps, data_count);
        self.latch(result)
    }

    /// Write the remaining data, data list and envelope of a stream and record the block.
    pub(super) fn finalize_stream(
        &mut self,
        streamer: StreamerHandle,
        trigger_time_ps: u64,
        data_count: u64,
    ) -> Result<()> {
        let mut stream = self
            .streams
            .remove(streamer)
            .ok_or_else(|| BdfError::NotStreaming(streamer.to_string()))?;
        if let Some(state) = self
            .groups
            .get_mut(stream.group)
            .and_then(|g| g.inputs.get_mut(stream.input))
        {
            state.open_stream = None;
        }

        if !stream.pending.is_empty() {
            let fragment = self.sink.write_data_block(&stream.pending)?;
            stream.fragments.push(fragment);
            stream.pending.clear();
        }

        let bps = stream.layout.bytes_per_sample() as u64;
        let block_length = data_count / bps;
        let fragments = truncate_fragments(&stream.fragments, data_count);
        let envelope = if stream.envelope.samples() == block_length {
            stream.envelope.finish()
        } else {
            self.rebuild_envelope(&stream.layout, &fragments, block_length)?
        };

        let data_list_addr = if fragments.is_empty() {
            0
        } else {
            let links = fragments.iter().map(|f| f.offset - BlockHeader::SIZE as u64).collect();
            self.sink.write_block(&DataListBlock::new(links).to_bytes()?)?
        };
        let envelope_addr = if envelope.levels.is_empty() {
            0
        } else {
            self.sink.write_block(&EnvelopeBlock::new(envelope.clone()).to_bytes()?)?
        };

        let group_state = self
            .groups
            .get_mut(stream.group)
            .ok_or_else(|| BdfError::StaleHandle(stream.group.to_string()))?;
        let index = group_state.index;
        if let Some(state) = group_state.inputs.get_mut(stream.input) {
            state.next_block = stream.block + 1;
        }
        let entry = &self.directory.groups[index];
        let preferred = fragments.iter().map(|f| f.len / bps).max().unwrap_or(0);
        let info = BlockInfo {
            reduction_factor: envelope.reduction_factor,
            number_of_reductions: envelope.number_of_reductions(),
            preferred_transfer_size: preferred.min(u32::MAX as u64) as u32,
            block_length,
            external_timebase: false,
            sample_rate_hertz: entry.sample_rate,
            timebase_divisor: entry.timebase_divisor,
            start_time: entry.start_time,
            trigger_time_seconds: trigger_time_ps as f64 * 1e-12,
            trigger_sample: entry.trigger_sample as u64,
            stop_trigger_sample: if entry.mode.has_stop_trigger() {
                block_length.saturating_sub(1)
            } else {
                0
            },
        };
        debug!(
            group = entry.number,
            input = stream.input,
            block = stream.block,
            samples = block_length,
            fragments = fragments.len(),
            "finalized block"
        );
        self.directory.groups[index].inputs[stream.input].blocks.push(BlockEntry {
            index: stream.block,
            info,
            fragments,
            envelope,
            data_list_addr,
            envelope_addr,
        });
        Ok(())
    }

    /// Recompute an envelope from the stored bytes of a truncated block.
    fn rebuild_envelope(
        &mut self,
        layout: &SampleLayout,
        fragments: &[Fragment],
        block_length: u64,
    ) -> Result<Envelope> {
        let mut builder = EnvelopeBuilder::new(self.options.reduction_factor, self.options.max_reductions);
        let bps = layout.bytes_per_sample() as usize;
        let mut carry = Vec::with_capacity(bps);
        let mut buf = Vec::new();
        for fragment in fragments {
            buf.resize(fragment.len as usize, 0);
            self.sink.read_at(fragment.offset, &mut buf)?;
            for &byte in &buf {
                carry.push(byte);
                if carry.len() == bps {
                    builder.push(layout.analog(layout.decode_word(&carry)));
                    carry.clear();
                }
            }
        }
        if builder.samples() != block_length {
            return Err(BdfError::BlockSerializationError(format!(
                "rebuilt {} samples, expected {}",
                builder.samples(),
                block_length
            )));
        }
        Ok(builder.finish())
    }
}

/// Keep the first `len` bytes of a fragment list.
fn truncate_fragments(fragments: &[Fragment], len: u64) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut left = len;
    for fragment in fragments {
        if left == 0 {
            break;
        }
        let take = fragment.len.min(left);
        out.push(Fragment { offset: fragment.offset, len: take });
        left -= take;
    }
    out
}
