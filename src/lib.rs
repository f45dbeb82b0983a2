// hcastream library
// Buffered block-stream decoding and key scoring for block-compressed audio

pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod sound;

pub use config::KeyTestConfig;
pub use error::{HcaError, HcaResult};
pub use logging::LogLevel;
pub use sound::{BlockDecoder, CodecSession, KeyCandidate, KeyScore, StreamInfo};
