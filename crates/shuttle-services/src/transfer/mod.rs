//! Transfer handlers. Each call is received, persisted, then echoed back.
//!
//! Both modes run three strictly sequential phases on one call:
//! drain inbound frames into buffers, write every buffer to the store,
//! then re-read each stored sequence and stream it back in chunks.
//! The first error in any phase ends the call.

mod multiple;
mod single;

pub use multiple::MultipleTransfer;
pub use single::SingleTransfer;

use crate::channel::TransportError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
