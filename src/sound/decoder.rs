//! Block decoder trait definition
//!
//! Defines the `BlockDecoder` trait that the streaming engine and the key
//! scorer call into. The bit-level work (entropy decoding, dequantization,
//! inverse transform) lives behind this trait; the session only moves whole
//! blocks in and whole windows of PCM out.

use crate::error::{HcaError, HcaResult};

/// Status code returned by a block decoder when it rejects input
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block decoder error, code={code}")]
pub struct BlockError {
    pub code: i32,
}

impl BlockError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Result type for block decoder operations
pub type BlockResult<T> = Result<T, BlockError>;

/// Stream layout parsed once from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfo {
    /// Interleaved channels per sample frame
    pub channel_count: u32,
    /// Sample frequency in Hz
    pub sample_rate: u32,
    /// Sample frames produced by one block
    pub samples_per_block: u32,
    /// Bytes per compressed block
    pub block_size: u32,
    /// Total blocks in the stream
    pub block_count: u32,
    /// Offset of the first block
    pub header_size: u32,
    /// Sample frames to drop at the true start
    pub encoder_delay: u32,
    /// Block to resume from when looping
    pub loop_start_block: u32,
    /// Sample frames to drop after seeking to the loop start
    pub loop_start_delay: u32,
}

impl StreamInfo {
    /// Check the invariants the streaming engine relies on
    pub fn validate(&self) -> HcaResult<()> {
        if self.block_size == 0 {
            return Err(HcaError::Format("block size is zero".into()));
        }
        if self.channel_count == 0 {
            return Err(HcaError::Format("channel count is zero".into()));
        }
        if self.samples_per_block == 0 {
            return Err(HcaError::Format("samples per block is zero".into()));
        }
        if self.loop_start_block > self.block_count {
            return Err(HcaError::Format(format!(
                "loop start block {} past block count {}",
                self.loop_start_block, self.block_count
            )));
        }
        Ok(())
    }

    /// Byte offset of block `index`
    pub fn block_offset(&self, index: u32) -> u64 {
        self.header_size as u64 + index as u64 * self.block_size as u64
    }

    /// Number of i16 slots needed for one decoded block
    pub fn window_len(&self) -> usize {
        self.channel_count as usize * self.samples_per_block as usize
    }

    /// Playable sample frames from the true start
    pub fn total_samples(&self) -> u64 {
        (self.block_count as u64 * self.samples_per_block as u64)
            .saturating_sub(self.encoder_delay as u64)
    }
}

/// Block decoder trait
///
/// One instance holds the decode context of one stream. Decoding may be
/// stateful across blocks, so `reset_state` is the only way to start fresh.
/// Releasing the context is `Drop`.
pub trait BlockDecoder: Send {
    /// Identify the format from the first bytes of a stream
    ///
    /// # Returns
    /// Full header size in bytes
    fn probe_format(&self, probe: &[u8]) -> BlockResult<usize>;

    /// Parse the full header
    fn decode_header(&mut self, header: &[u8]) -> BlockResult<()>;

    /// Stream layout of the parsed header
    fn info(&self) -> BlockResult<StreamInfo>;

    /// Set the obfuscation key used for subsequent blocks
    fn set_key(&mut self, key: u64);

    /// Decode one compressed block
    fn decode_block(&mut self, block: &[u8]) -> BlockResult<()>;

    /// Copy the last decoded block as interleaved PCM
    ///
    /// `dst` holds `channel_count * samples_per_block` slots.
    fn read_samples(&mut self, dst: &mut [i16]);

    /// Score a block's internal consistency under the current key
    ///
    /// # Returns
    /// 0 for a blank block, 1 for a perfect one, larger for less plausible ones
    fn test_block(&mut self, block: &[u8]) -> BlockResult<u32>;

    /// Clear inter-block decode state
    fn reset_state(&mut self);
}

impl<D: BlockDecoder + ?Sized> BlockDecoder for Box<D> {
    fn probe_format(&self, probe: &[u8]) -> BlockResult<usize> {
        (**self).probe_format(probe)
    }

    fn decode_header(&mut self, header: &[u8]) -> BlockResult<()> {
        (**self).decode_header(header)
    }

    fn info(&self) -> BlockResult<StreamInfo> {
        (**self).info()
    }

    fn set_key(&mut self, key: u64) {
        (**self).set_key(key)
    }

    fn decode_block(&mut self, block: &[u8]) -> BlockResult<()> {
        (**self).decode_block(block)
    }

    fn read_samples(&mut self, dst: &mut [i16]) {
        (**self).read_samples(dst)
    }

    fn test_block(&mut self, block: &[u8]) -> BlockResult<u32> {
        (**self).test_block(block)
    }

    fn reset_state(&mut self) {
        (**self).reset_state()
    }
}
