//! Random access to the samples of one finalized block.
//!
//! Every read validates `address + count` against the block length before any
//! byte is fetched. Output slices are filled completely; their length is the
//! requested sample count.

use crate::envelope::{self, MinMax};
use crate::error::{BdfError, Result};
use crate::parsing::directory::BlockEntry;
use crate::parsing::source::ByteSource;
use crate::scaling::{SampleLayout, Scaling};
use crate::types::InputInfo;

/// Samples fetched per storage read while scanning.
const SCAN_CHUNK: u64 = 16 * 1024;

pub struct BlockReader<'a> {
    layout: SampleLayout,
    scaling: Scaling,
    block: &'a BlockEntry,
    source: &'a dyn ByteSource,
}

impl<'a> BlockReader<'a> {
    pub fn new(info: &InputInfo, block: &'a BlockEntry, source: &'a dyn ByteSource) -> Self {
        BlockReader { layout: info.layout(), scaling: info.scaling(), block, source }
    }

    pub fn block_length(&self) -> u64 {
        self.block.info.block_length
    }

    fn check_range(&self, address: u64, count: u64) -> Result<()> {
        let end = address.checked_add(count).ok_or(BdfError::OutOfRange {
            what: "sample address",
            requested: u64::MAX,
            available: self.block_length(),
        })?;
        if end > self.block_length() {
            return Err(BdfError::OutOfRange {
                what: "sample address",
                requested: end,
                available: self.block_length(),
            });
        }
        Ok(())
    }

    /// Decode `count` words starting at `address` and hand each to `f` in order.
    fn for_each_word<F>(&self, address: u64, count: u64, mut f: F) -> Result<()>
    where
        F: FnMut(usize, i32),
    {
        let bps = self.layout.bytes_per_sample() as u64;
        let mut buf = Vec::new();
        let mut done = 0u64;
        while done < count {
            let n = (count - done).min(SCAN_CHUNK);
            buf.resize((n * bps) as usize, 0);
            self.block.read_bytes(self.source, (address + done) * bps, &mut buf)?;
            for (i, word) in buf.chunks_exact(bps as usize).enumerate() {
                f(done as usize + i, self.layout.decode_word(word));
            }
            done += n;
        }
        Ok(())
    }

    /// Low 16 bits of each word; only valid for inputs of at most two bytes.
    pub fn raw_s(&self, address: u64, out: &mut [i16]) -> Result<()> {
        if self.layout.bytes_per_sample() > 2 {
            return Err(BdfError::InvalidArgument(format!(
                "16 bit raw access to a {} byte input",
                self.layout.bytes_per_sample()
            )));
        }
        self.check_range(address, out.len() as u64)?;
        self.for_each_word(address, out.len() as u64, |i, w| out[i] = w as i16)
    }

    /// Full sign extended words, markers included.
    pub fn raw_l(&self, address: u64, out: &mut [i32]) -> Result<()> {
        self.check_range(address, out.len() as u64)?;
        self.for_each_word(address, out.len() as u64, |i, w| out[i] = w)
    }

    pub fn data_f(&self, address: u64, out: &mut [f32]) -> Result<()> {
        self.check_range(address, out.len() as u64)?;
        let (layout, scaling) = (self.layout, self.scaling);
        self.for_each_word(address, out.len() as u64, |i, w| {
            out[i] = scaling.physical(layout.analog(w)) as f32
        })
    }

    pub fn data_d(&self, address: u64, out: &mut [f64]) -> Result<()> {
        self.check_range(address, out.len() as u64)?;
        let (layout, scaling) = (self.layout, self.scaling);
        self.for_each_word(address, out.len() as u64, |i, w| {
            out[i] = scaling.physical(layout.analog(w))
        })
    }

    pub fn markers(&self, address: u64, out: &mut [u32]) -> Result<()> {
        self.check_range(address, out.len() as u64)?;
        let layout = self.layout;
        self.for_each_word(address, out.len() as u64, |i, w| out[i] = layout.markers(w))
    }

    /// Min/max of analog values over `[start, end)` read from storage.
    fn scan_analog(&self, start: u64, end: u64) -> Result<MinMax> {
        let mut acc = (i32::MAX, i32::MIN);
        let layout = self.layout;
        self.for_each_word(start, end - start, |_, w| {
            let a = layout.analog(w);
            acc = (acc.0.min(a), acc.1.max(a));
        })?;
        Ok(acc)
    }

    /// `count / 2` analog min/max pairs over `[address, address + block_size)`.
    pub fn envelope(&self, address: u64, block_size: u64, count: usize) -> Result<Vec<MinMax>> {
        self.check_range(address, block_size)?;
        envelope::reduce(&self.block.envelope, address, block_size, count, |s, e| {
            self.scan_analog(s, e)
        })
    }

    pub fn env_raw_s(&self, address: u64, block_size: u64, out: &mut [i16]) -> Result<()> {
        let pairs = self.envelope(address, block_size, out.len())?;
        for (dst, (min, max)) in out.chunks_exact_mut(2).zip(pairs) {
            dst[0] = min as i16;
            dst[1] = max as i16;
        }
        Ok(())
    }

    pub fn env_raw_l(&self, address: u64, block_size: u64, out: &mut [i32]) -> Result<()> {
        let pairs = self.envelope(address, block_size, out.len())?;
        for (dst, (min, max)) in out.chunks_exact_mut(2).zip(pairs) {
            dst[0] = min;
            dst[1] = max;
        }
        Ok(())
    }

    pub fn env_f(&self, address: u64, block_size: u64, out: &mut [f32]) -> Result<()> {
        let pairs = self.envelope(address, block_size, out.len())?;
        for (dst, (min, max)) in out.chunks_exact_mut(2).zip(pairs) {
            let (lo, hi) = self.scaling.physical_pair(min, max);
            dst[0] = lo as f32;
            dst[1] = hi as f32;
        }
        Ok(())
    }

    pub fn env_d(&self, address: u64, block_size: u64, out: &mut [f64]) -> Result<()> {
        let pairs = self.envelope(address, block_size, out.len())?;
        for (dst, (min, max)) in out.chunks_exact_mut(2).zip(pairs) {
            (dst[0], dst[1]) = self.scaling.physical_pair(min, max);
        }
        Ok(())
    }
}
