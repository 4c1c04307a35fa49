//! shuttle-core: wire format, frame types and configuration.
//! The services, daemon, and ctl crates all depend on this one.

pub mod config;
pub mod message;
pub mod wire;

pub use message::{
    chunk_count, multiple_key, single_key, split_chunks, Chunk, Frame, MultipleRequest,
    MultipleResponse, SingleRequest, SingleResponse, TransferId, Value, UNSET_ID,
};
pub use wire::{CallHeader, FrameHeader, FrameKind, Method, WireError, CHUNK_SIZE};

/// BLAKE3 digest of a byte sequence.
pub fn digest(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hex form of [`digest`], used in logs and ctl output.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(digest(data))
}
