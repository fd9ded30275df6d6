//! Multi-resolution min/max envelopes.
//!
//! Level `k` (1-based) of an [`Envelope`] holds one `(min, max)` pair per
//! `reduction_factor^k` samples, pair `j` covering samples
//! `[j * width, (j + 1) * width)`; the last pair of a level may be partial.
//! Envelope queries split a sample range into nearly equal segments and use
//! the coarsest level that fits inside each segment, scanning raw samples only
//! at unaligned edges.

use serde::{Deserialize, Serialize};

use crate::error::{BdfError, Result};

pub type MinMax = (i32, i32);

#[inline]
fn merge(a: MinMax, b: MinMax) -> MinMax {
    (a.0.min(b.0), a.1.max(b.1))
}

/// Precomputed reduction curves of one block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub reduction_factor: u32,
    pub levels: Vec<Vec<MinMax>>,
}

impl Envelope {
    pub fn empty(reduction_factor: u32) -> Self {
        Envelope { reduction_factor, levels: Vec::new() }
    }

    pub fn number_of_reductions(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Samples covered by one pair of `level` (level 0 = raw samples).
    fn width(&self, level: usize) -> u64 {
        (self.reduction_factor as u64).saturating_pow(level as u32)
    }

    /// Min/max over `[start, end)`; `scan` reads raw samples of a subrange.
    pub fn span_min_max<F>(&self, start: u64, end: u64, scan: &mut F) -> Result<MinMax>
    where
        F: FnMut(u64, u64) -> Result<MinMax>,
    {
        // a factor below 2 has no usable levels; scan raw samples
        let mut level = if self.reduction_factor < 2 { 0 } else { self.levels.len() };
        while level > 0 && self.width(level) > end - start {
            level -= 1;
        }
        match self.span_at(start, end, level, scan)? {
            Some(mm) => Ok(mm),
            None => Err(BdfError::InvalidArgument("empty envelope segment".into())),
        }
    }

    fn span_at<F>(&self, start: u64, end: u64, level: usize, scan: &mut F) -> Result<Option<MinMax>>
    where
        F: FnMut(u64, u64) -> Result<MinMax>,
    {
        if start >= end {
            return Ok(None);
        }
        if level == 0 {
            return scan(start, end).map(Some);
        }
        let width = self.width(level);
        let first = start.div_ceil(width);
        let last = end / width;
        if first >= last {
            return self.span_at(start, end, level - 1, scan);
        }
        let pairs = &self.levels[level - 1];
        if last as usize > pairs.len() {
            return Err(BdfError::BlockSerializationError(format!(
                "envelope level {} has {} pairs, need {}",
                level,
                pairs.len(),
                last
            )));
        }
        let mut acc = pairs[first as usize..last as usize]
            .iter()
            .copied()
            .fold((i32::MAX, i32::MIN), merge);
        if let Some(left) = self.span_at(start, first * width, level - 1, scan)? {
            acc = merge(acc, left);
        }
        if let Some(right) = self.span_at(last * width, end, level - 1, scan)? {
            acc = merge(acc, right);
        }
        Ok(Some(acc))
    }
}

/// Incrementally builds an [`Envelope`] from samples pushed in order.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    reduction_factor: u32,
    max_levels: usize,
    levels: Vec<Vec<MinMax>>,
    pending: Vec<Option<(MinMax, u32)>>,
    samples: u64,
}

impl EnvelopeBuilder {
    pub fn new(reduction_factor: u32, max_levels: u32) -> Self {
        let max_levels = max_levels as usize;
        EnvelopeBuilder {
            reduction_factor,
            max_levels,
            levels: vec![Vec::new(); max_levels],
            pending: vec![None; max_levels],
            samples: 0,
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn push(&mut self, value: i32) {
        self.samples += 1;
        self.feed(0, (value, value));
    }

    fn feed(&mut self, level: usize, pair: MinMax) {
        if level >= self.max_levels {
            return;
        }
        let (acc, count) = match self.pending[level] {
            Some((acc, count)) => (merge(acc, pair), count + 1),
            None => (pair, 1),
        };
        if count == self.reduction_factor {
            self.pending[level] = None;
            self.levels[level].push(acc);
            self.feed(level + 1, acc);
        } else {
            self.pending[level] = Some((acc, count));
        }
    }

    /// Flush partial pairs and keep the levels whose pair width fits the block.
    pub fn finish(mut self) -> Envelope {
        for level in 0..self.max_levels {
            if let Some((acc, _)) = self.pending[level].take() {
                self.levels[level].push(acc);
                self.feed(level + 1, acc);
            }
        }
        let rf = self.reduction_factor as u64;
        let mut keep = 0;
        let mut width = 1u64;
        while keep < self.max_levels {
            width = match width.checked_mul(rf) {
                Some(w) if w <= self.samples => w,
                _ => break,
            };
            keep += 1;
        }
        self.levels.truncate(keep);
        Envelope { reduction_factor: self.reduction_factor, levels: self.levels }
    }
}

/// Split `[address, address + block_size)` into `count / 2` nearly equal segments.
///
/// The first `block_size % segments` segments are one sample longer.
pub fn segments(address: u64, block_size: u64, count: usize) -> Result<Vec<(u64, u64)>> {
    if count == 0 || count % 2 != 0 {
        return Err(BdfError::InvalidArgument(format!(
            "envelope count must be even and non-zero, got {}",
            count
        )));
    }
    let n = (count / 2) as u64;
    if n > block_size {
        return Err(BdfError::OutOfRange {
            what: "envelope pairs",
            requested: n,
            available: block_size,
        });
    }
    let base = block_size / n;
    let extra = block_size % n;
    let mut out = Vec::with_capacity(n as usize);
    let mut start = address;
    for i in 0..n {
        let len = if i < extra { base + 1 } else { base };
        out.push((start, start + len));
        start += len;
    }
    Ok(out)
}

/// Envelope of a sample range as `count / 2` min/max pairs.
pub fn reduce<F>(
    envelope: &Envelope,
    address: u64,
    block_size: u64,
    count: usize,
    mut scan: F,
) -> Result<Vec<MinMax>>
where
    F: FnMut(u64, u64) -> Result<MinMax>,
{
    segments(address, block_size, count)?
        .into_iter()
        .map(|(start, end)| envelope.span_min_max(start, end, &mut scan))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_scan(samples: &[i32]) -> impl FnMut(u64, u64) -> Result<MinMax> + '_ {
        move |s, e| {
            let slice = &samples[s as usize..e as usize];
            Ok((
                slice.iter().copied().min().unwrap_or(i32::MAX),
                slice.iter().copied().max().unwrap_or(i32::MIN),
            ))
        }
    }

    fn build(samples: &[i32], rf: u32, levels: u32) -> Envelope {
        let mut b = EnvelopeBuilder::new(rf, levels);
        for &s in samples {
            b.push(s);
        }
        b.finish()
    }

    #[test]
    fn segment_sizes_put_remainder_first() -> Result<()> {
        let lens: Vec<u64> = segments(100, 52, 10)?.iter().map(|(s, e)| e - s).collect();
        assert_eq!(lens, vec![11, 11, 10, 10, 10]);
        let segs = segments(0, 152, 10)?;
        let lens: Vec<u64> = segs.iter().map(|(s, e)| e - s).collect();
        assert_eq!(lens, vec![31, 31, 30, 30, 30]);
        assert_eq!(lens.iter().sum::<u64>(), 152);
        assert!(segs.windows(2).all(|w| w[0].1 == w[1].0));
        Ok(())
    }

    #[test]
    fn invalid_counts_rejected() {
        assert!(segments(0, 10, 0).is_err());
        assert!(segments(0, 10, 3).is_err());
        assert!(segments(0, 10, 22).is_err());
        assert!(segments(0, 10, 20).is_ok());
    }

    #[test]
    fn builder_levels_follow_block_length() {
        let samples: Vec<i32> = (0..100).collect();
        let env = build(&samples, 4, 8);
        // 4, 16, 64 <= 100 < 256
        assert_eq!(env.number_of_reductions(), 3);
        assert_eq!(env.levels[0].len(), 25);
        assert_eq!(env.levels[1].len(), 7);
        assert_eq!(env.levels[2].len(), 2);
        assert_eq!(env.levels[0][0], (0, 3));
        assert_eq!(env.levels[1][6], (96, 99));
        assert_eq!(env.levels[2][1], (64, 99));

        let short = build(&samples[..3], 4, 8);
        assert!(short.levels.is_empty());
    }

    #[test]
    fn envelope_matches_brute_force() -> Result<()> {
        let samples: Vec<i32> = (0..1000).map(|i| ((i * 7919) % 613) as i32 - 300).collect();
        let env = build(&samples, 4, 5);
        let mut calls = 0usize;
        let mut counting = |s: u64, e: u64| {
            calls += (e - s) as usize;
            raw_scan(&samples)(s, e)
        };
        let got = reduce(&env, 37, 900, 6, &mut counting)?;
        let expected = reduce(&Envelope::empty(4), 37, 900, 6, raw_scan(&samples))?;
        assert_eq!(got, expected);
        assert!(calls < 900);
        Ok(())
    }

    #[test]
    fn degenerate_factor_scans_raw_samples() -> Result<()> {
        let samples = [4, -2, 9, 1];
        let env = Envelope { reduction_factor: 0, levels: vec![vec![(0, 0); 2]] };
        let pairs = reduce(&env, 0, 4, 2, raw_scan(&samples))?;
        assert_eq!(pairs, vec![(-2, 9)]);
        Ok(())
    }

    #[test]
    fn one_pair_per_sample() -> Result<()> {
        let samples = [5, -1, 3];
        let env = build(&samples, 2, 4);
        let pairs = reduce(&env, 0, 3, 6, raw_scan(&samples))?;
        assert_eq!(pairs, vec![(5, 5), (-1, -1), (3, 3)]);
        Ok(())
    }
}
