//! Codec session and streaming decode engine
//!
//! A session turns "give me N sample frames" into block reads and block
//! decodes. Decoded blocks land in a one-block sample window; requests drain
//! the window and refill it on demand.
//!
//! Start-of-stream encoder delay and loop realignment share one mechanism:
//! `samples_to_discard` frames are consumed from the window without being
//! copied out.
//!
//! Mid-stream failures do not abort playback with an error. The remaining
//! output is left as the caller prepared it, the failure is logged, and it is
//! kept for [`CodecSession::take_error`].

use crate::config::KeyTestConfig;
use crate::error::{HcaError, HcaResult};
use crate::io::ByteSource;
use crate::{log_debug, log_warning};

use super::decoder::{BlockDecoder, StreamInfo};
use super::keytest;

/// Bytes read to identify the format
pub const PROBE_SIZE: usize = 8;

/// Largest header accepted from `probe_format`
///
/// Real headers are well under this; larger values come from corrupt input.
pub const MAX_HEADER_SIZE: usize = 0x1000;

/// Allocate a zeroed buffer, reporting allocation failure instead of aborting
fn alloc_buffer<T: Copy + Default>(len: usize, what: &str) -> HcaResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| HcaError::Resource(format!("{} ({} entries): {}", what, len, e)))?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// One open stream
///
/// Owns its byte source handle, decoder context, block scratch buffer and
/// sample window. Not for concurrent use; separate sessions are independent.
pub struct CodecSession<D: BlockDecoder = Box<dyn BlockDecoder>> {
    /// Private handle, duplicated from the caller's at open
    source: Box<dyn ByteSource>,
    /// Block decoder context
    decoder: D,
    /// Stream layout
    info: StreamInfo,
    /// Raw bytes of one block
    block_buffer: Vec<u8>,
    /// Interleaved PCM of one decoded block
    sample_buffer: Vec<i16>,
    /// Next block to read
    current_block: u32,
    /// Decoded frames not yet consumed
    samples_filled: u32,
    /// Window offset of the next unconsumed frame
    samples_consumed: u32,
    /// Frames still to drop before output resumes
    samples_to_discard: u32,
    /// Key used for playback; restored after every key test
    key: u64,
    /// Last mid-stream failure
    last_error: Option<HcaError>,
}

impl<D: BlockDecoder> CodecSession<D> {
    /// Open a stream
    ///
    /// The header is read through `source`; the session then takes its own
    /// duplicate, so `source` stays usable by the caller. Anything acquired
    /// before a failure is dropped on the way out.
    ///
    /// # Errors
    /// * `Format` - unrecognized, oversized or rejected header
    /// * `Io` - short header read
    /// * `Resource` - buffer allocation failed
    /// * `Source` - the byte source could not be duplicated
    pub fn open(source: &mut dyn ByteSource, decoder: D) -> HcaResult<Self> {
        Self::open_with_key(source, decoder, 0)
    }

    /// Open a stream obfuscated with `key`
    ///
    /// Same as [`open`](Self::open), with `key` applied to the decoder.
    pub fn open_with_key(
        source: &mut dyn ByteSource,
        mut decoder: D,
        key: u64,
    ) -> HcaResult<Self> {
        let name = source.name();

        let mut probe = [0u8; PROBE_SIZE];
        if source.read_at(&mut probe, 0) != PROBE_SIZE {
            return Err(HcaError::Format(format!("{}: too small for a header", name)));
        }
        let header_size = decoder
            .probe_format(&probe)
            .map_err(|e| HcaError::Format(format!("{}: not recognized ({})", name, e)))?;
        if header_size > MAX_HEADER_SIZE {
            return Err(HcaError::Format(format!(
                "{}: header size 0x{:x} over limit 0x{:x}",
                name, header_size, MAX_HEADER_SIZE
            )));
        }

        let mut header = vec![0u8; header_size];
        let got = source.read_at(&mut header, 0);
        if got != header_size {
            return Err(HcaError::Io {
                offset: 0,
                expected: header_size,
                got,
            });
        }

        decoder
            .decode_header(&header)
            .map_err(|e| HcaError::Format(format!("{}: header rejected ({})", name, e)))?;
        let info = decoder
            .info()
            .map_err(|e| HcaError::Format(format!("{}: no stream info ({})", name, e)))?;
        info.validate()?;

        let block_buffer = alloc_buffer::<u8>(info.block_size as usize, "block buffer")?;
        let sample_buffer = alloc_buffer::<i16>(info.window_len(), "sample window")?;

        if let Some(size) = source.size() {
            let end = info.block_offset(info.block_count);
            if size < end {
                log_warning!(
                    "{}: 0x{:x} bytes, blocks end at 0x{:x}; playback will be cut short",
                    name,
                    size,
                    end
                );
            }
        }

        let source = source
            .duplicate()
            .map_err(|e| HcaError::Source(format!("{}: {}", name, e)))?;
        decoder.set_key(key);

        let mut session = Self {
            source,
            decoder,
            info,
            block_buffer,
            sample_buffer,
            current_block: 0,
            samples_filled: 0,
            samples_consumed: 0,
            samples_to_discard: 0,
            key,
            last_error: None,
        };
        session.reset();

        log_debug!(
            "{}: {} ch, {} blocks of 0x{:x} bytes, {} samples/block, delay {}",
            name,
            info.channel_count,
            info.block_count,
            info.block_size,
            info.samples_per_block,
            info.encoder_delay
        );

        Ok(session)
    }

    /// Fill `out` with `samples` interleaved sample frames
    ///
    /// Past the last block the rest of the request is zero-filled. On a read
    /// or decode failure decoding stops, the untouched tail of `out` keeps
    /// whatever it held, and the error is kept for [`take_error`](Self::take_error).
    /// Callers wanting silence on failure pre-zero `out`.
    ///
    /// Requests larger than `out` are clamped to what it can hold.
    pub fn decode(&mut self, out: &mut [i16], samples: usize) {
        let channels = self.info.channel_count as usize;
        let samples_to_do = samples.min(out.len() / channels);
        if samples_to_do < samples {
            log_warning!(
                "{}: output holds {} of {} requested samples",
                self.source.name(),
                samples_to_do,
                samples
            );
        }

        let mut samples_done = 0usize;
        while samples_done < samples_to_do {
            if self.samples_filled > 0 {
                let mut samples_to_get = self.samples_filled as usize;

                if self.samples_to_discard > 0 {
                    samples_to_get = samples_to_get.min(self.samples_to_discard as usize);
                    self.samples_to_discard -= samples_to_get as u32;
                } else {
                    samples_to_get = samples_to_get.min(samples_to_do - samples_done);

                    let src = self.samples_consumed as usize * channels;
                    let dst = samples_done * channels;
                    let len = samples_to_get * channels;
                    out[dst..dst + len].copy_from_slice(&self.sample_buffer[src..src + len]);
                    samples_done += samples_to_get;
                }

                self.samples_consumed += samples_to_get as u32;
                self.samples_filled -= samples_to_get as u32;
            } else {
                if self.current_block >= self.info.block_count {
                    out[samples_done * channels..samples_to_do * channels].fill(0);
                    break;
                }

                if let Err(err) = self.decode_next_block() {
                    log_warning!("{}: {}", self.source.name(), err);
                    self.last_error = Some(err);
                    break;
                }
            }
        }
    }

    /// Decode `samples` frames into a fresh zeroed buffer
    pub fn decode_to_vec(&mut self, samples: usize) -> Vec<i16> {
        let mut out = vec![0i16; samples * self.info.channel_count as usize];
        self.decode(&mut out, samples);
        out
    }

    /// Read and decode the block at `current_block` into the sample window
    fn decode_next_block(&mut self) -> HcaResult<()> {
        let offset = self.info.block_offset(self.current_block);
        let expected = self.block_buffer.len();

        let got = self.source.read_at(&mut self.block_buffer, offset);
        if got != expected {
            return Err(HcaError::Io {
                offset,
                expected,
                got,
            });
        }

        self.decoder
            .decode_block(&self.block_buffer)
            .map_err(|e| HcaError::Decode { offset, code: e.code })?;
        self.decoder.read_samples(&mut self.sample_buffer);

        self.current_block += 1;
        self.samples_consumed = 0;
        self.samples_filled += self.info.samples_per_block;
        Ok(())
    }

    /// Rewind to the true start
    ///
    /// Clears decoder state and re-arms the encoder delay discard.
    pub fn reset(&mut self) {
        self.decoder.reset_state();
        self.current_block = 0;
        self.samples_filled = 0;
        self.samples_consumed = 0;
        self.samples_to_discard = self.info.encoder_delay;
        self.last_error = None;
    }

    /// Move the read cursor to the loop start
    ///
    /// Decoder state carries over; only position and discard change.
    pub fn seek_to_loop(&mut self) {
        self.current_block = self.info.loop_start_block;
        self.samples_filled = 0;
        self.samples_consumed = 0;
        self.samples_to_discard = self.info.loop_start_delay;
    }

    /// Apply `key` for playback
    ///
    /// Decoder state is reset, since blocks decoded under the old key say
    /// nothing about the new one. The read cursor is left alone.
    pub fn set_key(&mut self, key: u64) {
        self.key = key;
        self.decoder.set_key(key);
        self.decoder.reset_state();
    }

    /// Key currently applied for playback
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Score `key` with the default tunables
    ///
    /// # Returns
    /// <0: wrong key or unreadable stream, 0: inconclusive (silent), >0: plausible,
    /// the closer to 1 the better
    pub fn score_key(&mut self, key: u64) -> i32 {
        self.score_key_with(&KeyTestConfig::default(), key)
    }

    /// Score `key` with explicit tunables
    ///
    /// Leaves the streaming cursor alone. Afterwards the playback key is back
    /// in place and decoder state is reset.
    pub fn score_key_with(&mut self, config: &KeyTestConfig, key: u64) -> i32 {
        keytest::score_blocks(
            &mut *self.source,
            &mut self.decoder,
            &self.info,
            &mut self.block_buffer,
            config,
            key,
            self.key,
        )
    }

    /// Release the session
    pub fn close(self) {
        log_debug!("{}: closed", self.source.name());
    }

    /// Return and clear the last mid-stream failure
    pub fn take_error(&mut self) -> Option<HcaError> {
        self.last_error.take()
    }

    /// Whether a mid-stream failure is pending
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Whether every block was read and the window is drained
    pub fn is_finished(&self) -> bool {
        self.current_block >= self.info.block_count && self.samples_filled == 0
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn current_block(&self) -> u32 {
        self.current_block
    }

    pub fn samples_filled(&self) -> u32 {
        self.samples_filled
    }

    pub fn samples_consumed(&self) -> u32 {
        self.samples_consumed
    }

    pub fn samples_to_discard(&self) -> u32 {
        self.samples_to_discard
    }
}

impl<D: BlockDecoder> std::fmt::Debug for CodecSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSession")
            .field("source", &self.source.name())
            .field("info", &self.info)
            .field("current_block", &self.current_block)
            .field("samples_filled", &self.samples_filled)
            .field("samples_consumed", &self.samples_consumed)
            .field("samples_to_discard", &self.samples_to_discard)
            .field("key", &format_args!("0x{:016x}", self.key))
            .field("last_error", &self.last_error)
            .finish()
    }
}
