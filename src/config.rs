use anyhow::{Context, Result};

use crate::sound::keytest::KeyCandidate;

/// Arbitrary scale to simplify score comparisons
pub const SCORE_SCALE: i32 = 10;
/// Leading blank blocks ignored before testing starts
pub const MAX_SKIP_BLANKS: usize = 400;
/// Tested blocks needed before a perfect run collapses to score 1
pub const MIN_TEST_FRAMES: usize = 5;
/// Tested blocks per key
pub const MAX_TEST_FRAMES: usize = 10;
/// Per-block score above which the key is considered wrong
pub const MAX_FRAME_SCORE: u32 = 150;
/// Running total above which testing stops early
pub const MAX_TOTAL_SCORE: i32 = MAX_TEST_FRAMES as i32 * 50 * SCORE_SCALE;

/// Tunables for key scoring
///
/// The defaults are empirically tuned; almost silent or badly mastered
/// streams may need more test frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTestConfig {
    pub score_scale: i32,
    pub max_skip_blanks: usize,
    /// Inclusive: a perfect run of exactly this many blocks already scores 1
    pub min_test_frames: usize,
    pub max_test_frames: usize,
    pub max_frame_score: u32,
    pub max_total_score: i32,
}

impl Default for KeyTestConfig {
    fn default() -> Self {
        Self {
            score_scale: SCORE_SCALE,
            max_skip_blanks: MAX_SKIP_BLANKS,
            min_test_frames: MIN_TEST_FRAMES,
            max_test_frames: MAX_TEST_FRAMES,
            max_frame_score: MAX_FRAME_SCORE,
            max_total_score: MAX_TOTAL_SCORE,
        }
    }
}

impl KeyTestConfig {
    /// Change the tested block count, rescaling the early-stop total with it
    pub fn with_test_frames(mut self, min: usize, max: usize) -> Self {
        self.min_test_frames = min;
        self.max_test_frames = max;
        self.max_total_score = i32::try_from(max)
            .unwrap_or(i32::MAX)
            .saturating_mul(50)
            .saturating_mul(self.score_scale);
        self
    }
}

/// Parse a keycode written as decimal or `0x` hex
pub fn parse_keycode(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty keycode");
    }
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => {
            u64::from_str_radix(hex, 16).with_context(|| format!("Invalid hex keycode '{}'", s))
        }
        None => s.parse::<u64>().with_context(|| format!("Invalid keycode '{}'", s)),
    }
}

/// Parse a text key list
///
/// One candidate per line, `key` or `key:subkey`. Blank lines and
/// `#` comments are skipped.
pub fn parse_key_list(text: &str) -> Result<Vec<KeyCandidate>> {
    let mut keys = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let candidate = match line.split_once(':') {
            Some((key, subkey)) => {
                let key = parse_keycode(key).with_context(|| format!("line {}", lineno + 1))?;
                let subkey = parse_keycode(subkey).with_context(|| format!("line {}", lineno + 1))?;
                let subkey = u16::try_from(subkey)
                    .with_context(|| format!("line {}: subkey out of range", lineno + 1))?;
                KeyCandidate::with_subkey(key, subkey)
            }
            None => {
                KeyCandidate::new(parse_keycode(line).with_context(|| format!("line {}", lineno + 1))?)
            }
        };
        keys.push(candidate);
    }
    Ok(keys)
}

/// Parse a binary key file
///
/// 8 bytes of big-endian key, optionally followed by a 2-byte big-endian subkey.
pub fn parse_keyfile_bytes(data: &[u8]) -> Result<KeyCandidate> {
    match data.len() {
        8 | 10 => {
            let mut key = [0u8; 8];
            key.copy_from_slice(&data[..8]);
            let key = u64::from_be_bytes(key);
            if data.len() == 10 {
                Ok(KeyCandidate::with_subkey(key, u16::from_be_bytes([data[8], data[9]])))
            } else {
                Ok(KeyCandidate::new(key))
            }
        }
        n => anyhow::bail!("Key file must be 8 or 10 bytes, got {}", n),
    }
}
