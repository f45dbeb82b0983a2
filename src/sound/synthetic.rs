//! Synthetic block decoder
//!
//! A deterministic stand-in for a real block codec. It understands a tiny
//! container with the same shape as the real thing (header, fixed-size
//! blocks, optional key obfuscation) so the streaming engine and the key
//! scorer can be exercised end to end without a bitstream decoder.
//!
//! # Format
//!
//! ```text
//! header (HEADER_SIZE bytes, big-endian):
//! [4 bytes] magic "SYNB"
//! [2 bytes] header size
//! [2 bytes] reserved
//! [4 bytes] channel count
//! [4 bytes] sample rate
//! [4 bytes] samples per block
//! [4 bytes] block size
//! [4 bytes] block count
//! [4 bytes] encoder delay
//! [4 bytes] loop start block
//! [4 bytes] loop start delay
//!
//! block (block size bytes, XORed with the key stream):
//! [1 byte ] quality (0 = silent, 1 = clean, n = test score n)
//! [4 bytes] block index
//! [N bytes] filler
//! [4 bytes] FNV-1a checksum of everything before it
//! ```
//!
//! Decoded samples are a pure function of the absolute sample frame and the
//! channel, see [`sample_value`].

use super::decoder::{BlockDecoder, BlockError, BlockResult, StreamInfo};

/// Container magic
pub const SYNTHETIC_MAGIC: [u8; 4] = *b"SYNB";

/// Header size written by [`SyntheticStream`]
pub const HEADER_SIZE: u32 = 0x30;

/// Smallest block that can carry quality, index and checksum
pub const MIN_BLOCK_SIZE: u32 = 16;

/// `test_block` score reported when the checksum does not match
pub const WRONG_KEY_SCORE: u32 = 0x400;

const CHECKSUM_LEN: usize = 4;

/// Decoded value of `channel` at absolute sample frame `frame`
pub fn sample_value(frame: u64, channel: u32, channels: u32) -> i16 {
    let n = frame * channels as u64 + channel as u64;
    // keep clear of 0 so non-silent output is never mistaken for padding
    ((n % 32000) + 1) as i16
}

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in data {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// XOR `data` with the key stream of `key`; key 0 leaves data unchanged
fn apply_key(data: &mut [u8], key: u64) {
    if key == 0 {
        return;
    }
    let mut state = key ^ 0x9E37_79B9_7F4A_7C15;
    for byte in data.iter_mut() {
        // xorshift64*
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        *byte ^= (state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 56) as u8;
    }
}

fn read_be_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Plain contents of one block after removing the key stream
struct PlainBlock {
    quality: u8,
    index: u32,
}

/// Reference block decoder for the synthetic container
#[derive(Debug, Default)]
pub struct SyntheticDecoder {
    /// Parsed header, once `decode_header` succeeded
    info: Option<StreamInfo>,
    /// Current obfuscation key
    key: u64,
    /// Scratch copy of the block being unpacked
    scratch: Vec<u8>,
    /// PCM of the last decoded block
    pcm: Vec<i16>,
    /// Blocks decoded since the last reset; the "inter-block state"
    decoded_since_reset: u64,
    /// Number of `reset_state` calls
    resets: u64,
}

impl SyntheticDecoder {
    /// Create a decoder with no header and key 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks decoded since the last `reset_state`
    pub fn decoded_since_reset(&self) -> u64 {
        self.decoded_since_reset
    }

    /// Number of times `reset_state` was called
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Current obfuscation key
    pub fn key(&self) -> u64 {
        self.key
    }

    fn unpack(&mut self, block: &[u8]) -> BlockResult<Option<PlainBlock>> {
        if block.len() < MIN_BLOCK_SIZE as usize {
            return Err(BlockError::new(-2));
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(block);
        apply_key(&mut self.scratch, self.key);

        let body = self.scratch.len() - CHECKSUM_LEN;
        if fnv1a(&self.scratch[..body]) != read_be_u32(&self.scratch, body) {
            return Ok(None);
        }
        Ok(Some(PlainBlock {
            quality: self.scratch[0],
            index: read_be_u32(&self.scratch, 1),
        }))
    }
}

impl BlockDecoder for SyntheticDecoder {
    fn probe_format(&self, probe: &[u8]) -> BlockResult<usize> {
        if probe.len() < 8 || probe[..4] != SYNTHETIC_MAGIC {
            return Err(BlockError::new(-1));
        }
        Ok(u16::from_be_bytes([probe[4], probe[5]]) as usize)
    }

    fn decode_header(&mut self, header: &[u8]) -> BlockResult<()> {
        if header.len() < 40 || header[..4] != SYNTHETIC_MAGIC {
            return Err(BlockError::new(-1));
        }
        let info = StreamInfo {
            header_size: u16::from_be_bytes([header[4], header[5]]) as u32,
            channel_count: read_be_u32(header, 8),
            sample_rate: read_be_u32(header, 12),
            samples_per_block: read_be_u32(header, 16),
            block_size: read_be_u32(header, 20),
            block_count: read_be_u32(header, 24),
            encoder_delay: read_be_u32(header, 28),
            loop_start_block: read_be_u32(header, 32),
            loop_start_delay: read_be_u32(header, 36),
        };
        if info.block_size < MIN_BLOCK_SIZE {
            return Err(BlockError::new(-3));
        }
        self.pcm = vec![0; info.window_len()];
        self.info = Some(info);
        Ok(())
    }

    fn info(&self) -> BlockResult<StreamInfo> {
        self.info.ok_or(BlockError::new(-1))
    }

    fn set_key(&mut self, key: u64) {
        self.key = key;
    }

    fn decode_block(&mut self, block: &[u8]) -> BlockResult<()> {
        let info = self.info.ok_or(BlockError::new(-1))?;
        let plain = self.unpack(block)?.ok_or(BlockError::new(-4))?;

        let channels = info.channel_count;
        let first = plain.index as u64 * info.samples_per_block as u64;
        for (i, slot) in self.pcm.iter_mut().enumerate() {
            *slot = if plain.quality == 0 {
                0
            } else {
                let frame = first + (i / channels as usize) as u64;
                sample_value(frame, i as u32 % channels, channels)
            };
        }
        self.decoded_since_reset += 1;
        Ok(())
    }

    fn read_samples(&mut self, dst: &mut [i16]) {
        let n = dst.len().min(self.pcm.len());
        dst[..n].copy_from_slice(&self.pcm[..n]);
    }

    fn test_block(&mut self, block: &[u8]) -> BlockResult<u32> {
        match self.unpack(block)? {
            Some(plain) => Ok(plain.quality as u32),
            None => Ok(WRONG_KEY_SCORE),
        }
    }

    fn reset_state(&mut self) {
        self.decoded_since_reset = 0;
        self.resets += 1;
        self.pcm.fill(0);
    }
}

/// Builder for synthetic container bytes
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    info: StreamInfo,
    key: u64,
    quality: Vec<u8>,
}

impl SyntheticStream {
    /// Stream of `block_count` clean blocks
    pub fn new(channels: u32, samples_per_block: u32, block_count: u32) -> Self {
        Self {
            info: StreamInfo {
                channel_count: channels,
                sample_rate: 48000,
                samples_per_block,
                block_size: 0x40,
                block_count,
                header_size: HEADER_SIZE,
                encoder_delay: 0,
                loop_start_block: 0,
                loop_start_delay: 0,
            },
            key: 0,
            quality: vec![1; block_count as usize],
        }
    }

    pub fn block_size(mut self, size: u32) -> Self {
        self.info.block_size = size;
        self
    }

    pub fn encoder_delay(mut self, delay: u32) -> Self {
        self.info.encoder_delay = delay;
        self
    }

    pub fn loop_start(mut self, block: u32, delay: u32) -> Self {
        self.info.loop_start_block = block;
        self.info.loop_start_delay = delay;
        self
    }

    /// Obfuscate every block with `key`
    pub fn key(mut self, key: u64) -> Self {
        self.key = key;
        self
    }

    /// Set the quality byte of one block
    pub fn quality(mut self, block: usize, quality: u8) -> Self {
        if let Some(q) = self.quality.get_mut(block) {
            *q = quality;
        }
        self
    }

    /// Make the first `count` blocks silent
    pub fn silent_prefix(mut self, count: usize) -> Self {
        for q in self.quality.iter_mut().take(count) {
            *q = 0;
        }
        self
    }

    /// Stream layout the built bytes will report
    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Serialize header and blocks
    pub fn build(&self) -> Vec<u8> {
        let info = &self.info;
        let mut out = Vec::with_capacity(
            info.header_size as usize + info.block_size as usize * info.block_count as usize,
        );

        out.extend_from_slice(&SYNTHETIC_MAGIC);
        out.extend_from_slice(&(info.header_size as u16).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        for field in [
            info.channel_count,
            info.sample_rate,
            info.samples_per_block,
            info.block_size,
            info.block_count,
            info.encoder_delay,
            info.loop_start_block,
            info.loop_start_delay,
        ] {
            out.extend_from_slice(&field.to_be_bytes());
        }
        out.resize(info.header_size as usize, 0);

        let size = info.block_size as usize;
        for (index, &quality) in self.quality.iter().enumerate() {
            let mut block = vec![0u8; size];
            block[0] = quality;
            block[1..5].copy_from_slice(&(index as u32).to_be_bytes());
            for (i, b) in block[5..size - CHECKSUM_LEN].iter_mut().enumerate() {
                *b = (i as u8).wrapping_mul(31).wrapping_add(index as u8);
            }
            let sum = fnv1a(&block[..size - CHECKSUM_LEN]);
            block[size - CHECKSUM_LEN..].copy_from_slice(&sum.to_be_bytes());
            apply_key(&mut block, self.key);
            out.extend_from_slice(&block);
        }
        out
    }
}
