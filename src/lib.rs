// src/lib.rs
//
// Embeddable ITCH 5.0 capture pipeline: a fixed-dispatch frame decoder, a
// lock-free MPMC ring, and an asynchronous writer with mmap / direct /
// buffered sink backends. The transport feeding frames in and anything
// downstream of the capture file live outside this crate.

pub mod clock;
pub mod config;
pub mod decoder;
pub mod gen;
pub mod protocol;
pub mod ring;
pub mod util;
pub mod writer;

pub use decoder::decode;
pub use protocol::{Body, Record};
pub use ring::MpmcRing;
pub use writer::{CaptureOptions, CaptureWriter, WriteMode};
