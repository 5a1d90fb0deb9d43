use super::backend::{CaptureFormat, SampleBuffer};

/// Regroups sample data into fixed-duration buffers
///
/// Device callbacks deliver whatever block size the host picks, and decoded
/// files arrive whole. Both leave here as `buffer_ms` buffers, timestamped from
/// the first sample.
pub struct BlockAccumulator {
    format: CaptureFormat,
    block_len: usize,
    pending: Vec<f32>,
    delivered: u64,
}

impl BlockAccumulator {
    pub fn new(format: CaptureFormat, buffer_ms: u64) -> Self {
        let block_len = format
            .samples_for_ms(buffer_ms.max(1))
            .max(usize::from(format.channels.max(1)));
        Self {
            format,
            block_len,
            pending: Vec::with_capacity(block_len),
            delivered: 0,
        }
    }

    /// Add callback samples, returning every buffer that is now complete
    pub fn push(&mut self, samples: impl IntoIterator<Item = f32>) -> Vec<SampleBuffer> {
        let mut ready = Vec::new();
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.block_len {
                let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_len));
                ready.push(self.emit(block));
            }
        }
        ready
    }

    /// Emit the incomplete tail, if any
    pub fn flush(&mut self) -> Option<SampleBuffer> {
        if self.pending.is_empty() {
            return None;
        }
        let block = std::mem::take(&mut self.pending);
        Some(self.emit(block))
    }

    fn emit(&mut self, block: Vec<f32>) -> SampleBuffer {
        let channels = u64::from(self.format.channels.max(1));
        let rate = u64::from(self.format.sample_rate.max(1));
        let timestamp_ms = self.delivered / channels * 1000 / rate;
        self.delivered += block.len() as u64;
        SampleBuffer::new(block, self.format, timestamp_ms)
    }
}
