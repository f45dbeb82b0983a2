//! Byte source abstraction
//!
//! Sessions read blocks through [`ByteSource`]; files and memory buffers are
//! provided, anything else can implement the trait.

pub mod source;

pub use source::{ByteSource, FileSource, MemorySource};
