use std::sync::Arc;

use bytes::BytesMut;

use shuttle_core::{
    digest_hex, single_key, split_chunks, SingleRequest, SingleResponse, TransferId, UNSET_ID,
};

use super::TransferError;
use crate::channel::{FrameChannel, TransportError};
use crate::store::Store;

/// Serves the `Single` method: one identifier, one byte sequence.
///
/// The receive buffer is not keyed by identifier. Chunks that arrive before
/// any identifier frame belong to whichever non-zero identifier is seen
/// last, and a call that never names one is persisted under `single_0`.
pub struct SingleTransfer<S> {
    store: Arc<S>,
}

impl<S: Store> SingleTransfer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn handle<C>(&self, channel: &mut C) -> Result<(), TransferError>
    where
        C: FrameChannel<Inbound = SingleRequest, Outbound = SingleResponse>,
    {
        let (id, buffer) = receive(channel).await?;

        let key = single_key(id);
        if id == UNSET_ID {
            tracing::warn!(%key, "no identifier received, persisting under the unset key");
        }
        self.store.write(&key, &buffer).await?;
        tracing::info!(
            id,
            %key,
            bytes = buffer.len(),
            digest = %digest_hex(&buffer),
            "transfer persisted"
        );
        drop(buffer);

        // Echo what the store holds, not what was buffered.
        let stored = self.store.read(&key).await?;

        channel.send(SingleResponse::Id(id)).await?;
        let mut chunks = 0usize;
        for chunk in split_chunks(&stored) {
            channel.send(SingleResponse::Chunk(chunk)).await?;
            chunks += 1;
        }

        tracing::info!(id, bytes = stored.len(), chunks, "transfer echoed");
        Ok(())
    }
}

async fn receive<C>(channel: &mut C) -> Result<(TransferId, BytesMut), TransportError>
where
    C: FrameChannel<Inbound = SingleRequest>,
{
    let mut id = UNSET_ID;
    let mut buffer = BytesMut::new();
    let mut frames = 0usize;
    let mut unattributed = 0usize;

    while let Some(frame) = channel.recv().await? {
        frames += 1;
        match frame {
            SingleRequest::Id(UNSET_ID) => {}
            SingleRequest::Id(next) => {
                if id != UNSET_ID && id != next {
                    tracing::debug!(previous = id, id = next, "identifier replaced");
                }
                id = next;
            }
            SingleRequest::Chunk(chunk) => {
                if id == UNSET_ID {
                    unattributed += chunk.data.len();
                }
                // The whole payload counts on receive, whatever `position` says.
                buffer.extend_from_slice(&chunk.data);
            }
        }
    }

    if unattributed > 0 && id != UNSET_ID {
        tracing::debug!(id, unattributed, "bytes received before identifier attributed to it");
    }
    tracing::debug!(id, frames, bytes = buffer.len(), "receive phase complete");
    Ok((id, buffer))
}
