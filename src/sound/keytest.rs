//! Key scoring
//!
//! Obfuscated streams decode to garbage under the wrong key, and the block
//! decoder can tell how plausible a block looks without fully decoding it.
//! Scoring a handful of blocks per candidate is enough to pick the right key
//! out of thousands.
//!
//! Scores: <0 wrong key (or unreadable stream), 0 inconclusive (every tested
//! block was blank), >0 plausible, with 1 meaning every tested block was
//! perfect.

use crate::config::KeyTestConfig;
use crate::error::{HcaError, HcaResult};
use crate::io::ByteSource;
use crate::{log_debug, log_error, log_info, log_trace};
use std::cmp::Ordering;

use super::decoder::{BlockDecoder, StreamInfo};
use super::session::CodecSession;

/// Score of a key candidate
///
/// Ordered by preference: positives from 1 upwards, then inconclusive, then
/// wrong. The smallest score is the best key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyScore(pub i32);

impl KeyScore {
    /// Wrong key or unreadable stream
    pub const WRONG: KeyScore = KeyScore(-1);
    /// Every tested block was perfect
    pub const BEST: KeyScore = KeyScore(1);

    pub fn is_wrong(self) -> bool {
        self.0 < 0
    }

    pub fn is_inconclusive(self) -> bool {
        self.0 == 0
    }

    pub fn is_best(self) -> bool {
        self.0 == 1
    }

    /// Whether this score should replace `best` in a key search
    ///
    /// Negative never wins; any non-negative score beats no score; a positive
    /// score beats an inconclusive one; among positives the lower wins.
    pub fn is_better_than(self, best: Option<KeyScore>) -> bool {
        !self.is_wrong() && best.map_or(true, |b| self < b)
    }

    fn rank(self) -> (u8, i32) {
        match self.0 {
            s if s > 0 => (0, s),
            0 => (1, 0),
            s => (2, s),
        }
    }
}

impl Ord for KeyScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for KeyScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i32> for KeyScore {
    fn from(score: i32) -> Self {
        KeyScore(score)
    }
}

/// A key to try, optionally with a per-file subkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyCandidate {
    pub key: u64,
    pub subkey: Option<u16>,
}

impl KeyCandidate {
    pub fn new(key: u64) -> Self {
        Self { key, subkey: None }
    }

    pub fn with_subkey(key: u64, subkey: u16) -> Self {
        Self {
            key,
            subkey: Some(subkey),
        }
    }

    /// Key handed to the block decoder
    ///
    /// A nonzero subkey is folded into the base key.
    pub fn effective_key(&self) -> u64 {
        match self.subkey {
            None | Some(0) => self.key,
            Some(sub) => {
                let mul = ((sub as u64) << 16) | ((!sub) as u64 + 2);
                self.key.wrapping_mul(mul)
            }
        }
    }
}

/// Outcome of a key search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySearchResult {
    /// Best candidate found
    pub candidate: KeyCandidate,
    /// Its score
    pub score: KeyScore,
    /// Position of the candidate in the searched list
    pub index: usize,
    /// Candidates scored before the search ended
    pub tested: usize,
}

/// Score `key` against the first blocks of a stream
///
/// Sets the key and tests blocks, then puts `restore_key` back and resets the
/// decoder so the next decode or key test starts clean.
pub(super) fn score_blocks<D: BlockDecoder>(
    source: &mut dyn ByteSource,
    decoder: &mut D,
    info: &StreamInfo,
    buffer: &mut [u8],
    config: &KeyTestConfig,
    key: u64,
    restore_key: u64,
) -> i32 {
    decoder.set_key(key);
    let score = test_blocks(source, decoder, info, buffer, config);
    decoder.set_key(restore_key);
    decoder.reset_state();
    log_trace!("key 0x{:016x}: score {}", key, score);
    score
}

fn test_blocks<D: BlockDecoder>(
    source: &mut dyn ByteSource,
    decoder: &mut D,
    info: &StreamInfo,
    buffer: &mut [u8],
    config: &KeyTestConfig,
) -> i32 {
    let mut test_frames = 0usize;
    let mut current_frame = 0u32;
    let mut blank_frames = 0usize;
    let mut total_score = 0i32;
    let mut found_regular_frame = false;
    let blank_score = 3i32.saturating_mul(config.score_scale);

    // A final score of 0 only happens for short streams made of blank blocks
    while test_frames < config.max_test_frames && current_frame < info.block_count {
        let offset = info.block_offset(current_frame);
        if source.read_at(buffer, offset) != buffer.len() {
            return -1;
        }

        let score = match decoder.test_block(buffer) {
            Ok(score) if score <= config.max_frame_score => score,
            _ => return -1,
        };

        current_frame += 1;

        // leading silence is common and says nothing about the key
        if score == 0 && blank_frames < config.max_skip_blanks && !found_regular_frame {
            blank_frames += 1;
            continue;
        }

        found_regular_frame = true;
        test_frames += 1;

        let frame_score = match score {
            1 => 1,
            // blanks after real content are not very trustworthy
            0 => blank_score,
            s => i32::try_from(s)
                .unwrap_or(i32::MAX)
                .saturating_mul(config.score_scale),
        };
        total_score = total_score.saturating_add(frame_score);

        // other keys will score better
        if total_score > config.max_total_score {
            break;
        }
    }

    // every tested block perfect: report the canonical best score
    if test_frames >= config.min_test_frames
        && total_score > 0
        && total_score <= i32::try_from(test_frames).unwrap_or(i32::MAX)
    {
        total_score = 1;
    }

    total_score
}

/// Try every candidate in order and keep the best
///
/// Stops early on a perfect score. Candidates scoring negative are skipped.
/// The winning key is applied to the session for playback; with no winner
/// the session keeps its key.
pub fn find_best_key<D: BlockDecoder>(
    session: &mut CodecSession<D>,
    candidates: &[KeyCandidate],
) -> Option<KeySearchResult> {
    find_best_key_with(session, &KeyTestConfig::default(), candidates)
}

/// [`find_best_key`] with explicit tunables
pub fn find_best_key_with<D: BlockDecoder>(
    session: &mut CodecSession<D>,
    config: &KeyTestConfig,
    candidates: &[KeyCandidate],
) -> Option<KeySearchResult> {
    let mut best: Option<KeySearchResult> = None;
    let mut tested = 0;

    for (index, candidate) in candidates.iter().enumerate() {
        let score = KeyScore(session.score_key_with(config, candidate.effective_key()));
        tested += 1;

        if score.is_better_than(best.map(|b| b.score)) {
            best = Some(KeySearchResult {
                candidate: *candidate,
                score,
                index,
                tested,
            });
        }
        if score.is_best() {
            break;
        }
    }

    let best = best.map(|b| KeySearchResult { tested, ..b });
    if let Some(found) = &best {
        session.set_key(found.candidate.effective_key());
    }
    best
}

/// Search candidates on several threads
///
/// Each worker opens its own session over its own duplicate of `source` with
/// a decoder from `make_decoder`. The result matches [`find_best_key`] on the
/// same list: same best score, earliest candidate on ties.
///
/// # Errors
/// Any error opening a worker session, or a worker panic.
pub fn find_best_key_parallel<D, F>(
    source: &dyn ByteSource,
    make_decoder: F,
    candidates: &[KeyCandidate],
    workers: usize,
) -> HcaResult<Option<KeySearchResult>>
where
    D: BlockDecoder,
    F: Fn() -> D + Sync,
{
    if candidates.is_empty() {
        return Ok(None);
    }
    let workers = workers.clamp(1, candidates.len());
    let chunk_size = candidates.len().div_ceil(workers);
    let config = KeyTestConfig::default();

    log_debug!(
        "{}: searching {} keys on {} workers",
        source.name(),
        candidates.len(),
        workers
    );

    // one handle per worker, taken here since the source itself is not Sync
    let handles = candidates
        .chunks(chunk_size)
        .map(|_| {
            source
                .duplicate()
                .map_err(|e| HcaError::Source(format!("{}: {}", source.name(), e)))
        })
        .collect::<HcaResult<Vec<_>>>()?;

    let chunk_results = crossbeam::thread::scope(|s| {
        let workers: Vec<_> = candidates
            .chunks(chunk_size)
            .zip(handles)
            .enumerate()
            .map(|(n, (chunk, mut handle))| {
                let make_decoder = &make_decoder;
                let config = &config;
                s.spawn(move |_| -> HcaResult<(usize, Option<KeySearchResult>)> {
                    let mut session = CodecSession::open(&mut *handle, make_decoder())?;
                    let found = find_best_key_with(&mut session, config, chunk);
                    Ok((n * chunk_size, found))
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|w| w.join())
            .collect::<Vec<_>>()
    })
    .map_err(|_| worker_panicked(source))?;

    let mut best: Option<KeySearchResult> = None;
    let mut tested = 0;
    for joined in chunk_results {
        let (base, found) =
            joined.map_err(|_| worker_panicked(source))??;
        if let Some(found) = found {
            tested += found.tested;
            if found.score.is_better_than(best.map(|b| b.score)) {
                best = Some(KeySearchResult {
                    index: base + found.index,
                    ..found
                });
            }
        } else {
            tested += candidates.len().min(base + chunk_size) - base;
        }
    }

    let best = best.map(|b| KeySearchResult { tested, ..b });
    if let Some(found) = &best {
        log_info!(
            "{}: key 0x{:016x} scored {} ({} of {} tried)",
            source.name(),
            found.candidate.effective_key(),
            found.score.0,
            found.tested,
            candidates.len()
        );
    }
    Ok(best)
}

fn worker_panicked(source: &dyn ByteSource) -> HcaError {
    log_error!("{}: key search worker panicked", source.name());
    HcaError::Resource("key search worker panicked".into())
}
