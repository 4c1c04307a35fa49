use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;

use shuttle_core::{
    digest_hex, multiple_key, split_chunks, MultipleRequest, MultipleResponse, TransferId, Value,
};

use super::TransferError;
use crate::channel::{FrameChannel, TransportError};
use crate::store::Store;

/// Serves the `Multiple` method: many identifiers interleaved on one call.
///
/// Each identifier gets its own buffer, created the first time it appears
/// (with or without a chunk). Persist and echo order across identifiers is
/// unspecified; within an identifier chunks keep arrival order.
pub struct MultipleTransfer<S> {
    store: Arc<S>,
}

impl<S: Store> MultipleTransfer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn handle<C>(&self, channel: &mut C) -> Result<(), TransferError>
    where
        C: FrameChannel<Inbound = MultipleRequest, Outbound = MultipleResponse>,
    {
        let buffers = receive(channel).await?;

        for (id, buffer) in &buffers {
            let key = multiple_key(*id);
            self.store.write(&key, buffer).await?;
            tracing::info!(
                id,
                %key,
                bytes = buffer.len(),
                digest = %digest_hex(buffer),
                "transfer persisted"
            );
        }

        let ids: Vec<TransferId> = buffers.keys().copied().collect();
        drop(buffers);

        let mut frames = 0usize;
        for id in ids {
            let stored = self.store.read(&multiple_key(id)).await?;
            // One value per frame.
            for chunk in split_chunks(&stored) {
                let frame = MultipleResponse {
                    values: vec![Value {
                        id,
                        chunk: Some(chunk),
                    }],
                };
                channel.send(frame).await?;
                frames += 1;
            }
            tracing::debug!(id, bytes = stored.len(), "identifier echoed");
        }

        tracing::info!(frames, "multiplex transfer echoed");
        Ok(())
    }
}

async fn receive<C>(channel: &mut C) -> Result<HashMap<TransferId, BytesMut>, TransportError>
where
    C: FrameChannel<Inbound = MultipleRequest>,
{
    let mut buffers: HashMap<TransferId, BytesMut> = HashMap::new();
    let mut frames = 0usize;

    while let Some(frame) = channel.recv().await? {
        frames += 1;
        for value in frame.values {
            let buffer = buffers.entry(value.id).or_default();
            if let Some(chunk) = value.chunk {
                buffer.extend_from_slice(&chunk.data);
            }
        }
    }

    tracing::debug!(frames, identifiers = buffers.len(), "receive phase complete");
    Ok(buffers)
}
