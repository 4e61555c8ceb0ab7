use std::collections::BTreeMap;

use crate::Error;

/// Byte coverage of one handshake message body.
///
/// Stored ranges never overlap or touch: an insert merges with every range it overlaps
/// or is adjacent to. Bytes already stored are never overwritten, so for overlapping
/// input the first write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentStream {
    declared_length: usize,
    // start offset → bytes
    ranges: BTreeMap<usize, Vec<u8>>,
}

impl FragmentStream {
    pub fn new(declared_length: usize) -> Self {
        FragmentStream {
            declared_length,
            ranges: BTreeMap::new(),
        }
    }

    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of disjoint ranges currently stored.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of covered bytes.
    pub fn covered(&self) -> usize {
        self.ranges.values().map(Vec::len).sum()
    }

    /// Whether `[offset, offset + bytes.len())` touches or overlaps existing coverage.
    ///
    /// An empty stream accepts anything. A range that would leave a hole is still
    /// accepted by [`insert_byte_array`][Self::insert_byte_array]; this only reports it.
    pub fn can_insert_byte_array(&self, bytes: &[u8], offset: usize) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        let end = offset + bytes.len();
        self.touching(offset, end).next().is_some()
    }

    /// Whether inserting would disagree with bytes already stored.
    pub fn conflicts_with(&self, bytes: &[u8], offset: usize) -> bool {
        let end = offset + bytes.len();
        self.touching(offset, end).any(|(start, stored)| {
            let from = offset.max(*start);
            let to = end.min(start + stored.len());
            (from..to).any(|pos| stored[pos - start] != bytes[pos - offset])
        })
    }

    /// Merge `bytes` at `offset` into the coverage.
    pub fn insert_byte_array(&mut self, bytes: &[u8], offset: usize) {
        if bytes.is_empty() {
            return;
        }
        let end = offset + bytes.len();

        let merged: Vec<usize> = self
            .touching(offset, end)
            .map(|(start, _)| *start)
            .collect();

        let mut new_start = offset;
        let mut new_end = end;
        for start in &merged {
            let len = self.ranges[start].len();
            new_start = new_start.min(*start);
            new_end = new_end.max(start + len);
        }

        let mut combined = vec![0u8; new_end - new_start];
        combined[offset - new_start..end - new_start].copy_from_slice(bytes);

        // Stored bytes go in last so they win over the new ones.
        for start in merged {
            if let Some(stored) = self.ranges.remove(&start) {
                combined[start - new_start..start - new_start + stored.len()]
                    .copy_from_slice(&stored);
            }
        }

        trace!(
            "Stream insert [{}, {}) -> range [{}, {})",
            offset,
            end,
            new_start,
            new_end
        );
        self.ranges.insert(new_start, combined);
    }

    /// Whether `[0, total_length)` is covered without gaps.
    pub fn is_complete(&self, total_length: i64) -> Result<bool, Error> {
        if total_length < 0 {
            return Err(Error::NegativeLength(total_length));
        }
        let total = total_length as usize;
        if total == 0 {
            return Ok(true);
        }
        Ok(self.prefix().is_some_and(|p| p.len() >= total))
    }

    /// Bytes of the contiguous prefix starting at offset 0, up to the first gap.
    pub fn get_complete_truncated_stream(&self) -> Vec<u8> {
        self.prefix().map(<[u8]>::to_vec).unwrap_or_default()
    }

    /// The declared length with gaps replaced by `fill`.
    ///
    /// Coverage beyond the declared length is cut off.
    pub fn get_complete_filled_stream(&self, fill: u8) -> Vec<u8> {
        let mut out = vec![fill; self.declared_length];
        for (start, bytes) in &self.ranges {
            if *start >= out.len() {
                break;
            }
            let n = bytes.len().min(out.len() - start);
            out[*start..start + n].copy_from_slice(&bytes[..n]);
        }
        out
    }

    fn prefix(&self) -> Option<&[u8]> {
        self.ranges.get(&0).map(Vec::as_slice)
    }

    /// Stored ranges overlapping or adjacent to `[start, end)`.
    fn touching(&self, start: usize, end: usize) -> impl Iterator<Item = (&usize, &Vec<u8>)> {
        self.ranges
            .range(..=end)
            .filter(move |(s, bytes)| *s + bytes.len() >= start)
    }
}
