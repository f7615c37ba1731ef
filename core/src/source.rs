//! Sample-source seam between capture hardware and the receiver.

/// Yields fixed-size blocks of normalized samples, one symbol period each.
///
/// Implementations own their recovery policy: a transient device read
/// failure is handled internally (reset the device and retry the same read)
/// and never surfaced here. `None` means the source is permanently
/// exhausted.
pub trait SampleSource {
    fn next_block(&mut self) -> Option<Vec<f32>>;
}

/// In-memory source that chunks a recording into symbol-period blocks.
///
/// A trailing partial block is discarded.
pub struct MemorySource {
    samples: Vec<f32>,
    block_len: usize,
    cursor: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, block_len: usize) -> Self {
        Self {
            samples,
            block_len,
            cursor: 0,
        }
    }
}

impl SampleSource for MemorySource {
    fn next_block(&mut self) -> Option<Vec<f32>> {
        if self.block_len == 0 || self.cursor + self.block_len > self.samples.len() {
            return None;
        }
        let block = self.samples[self.cursor..self.cursor + self.block_len].to_vec();
        self.cursor += self.block_len;
        Some(block)
    }
}
