//! shuttle-services: transfer handlers and the plumbing around them.
//!
//! The handlers only see a [`FrameChannel`] and a [`Store`]; the server
//! and client put TCP and the call preamble around them.

pub mod channel;
pub mod client;
pub mod server;
pub mod store;
pub mod transfer;

pub use channel::{memory_pair, FrameChannel, MemoryChannel, StreamChannel, TransportError};
pub use client::{Client, SingleEcho};
pub use server::{serve_connection, Server, DEFAULT_SHUTDOWN_GRACE};
pub use store::{FileStore, MemoryStore, Store, StoreError};
pub use transfer::{MultipleTransfer, SingleTransfer, TransferError};
