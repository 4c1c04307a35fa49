//! Client side of a call. Streams bytes up and collects the echo.
//!
//! The generic `send_*` / `collect_*` functions work on any frame channel;
//! [`Client`] puts them on a TCP connection.

use std::collections::HashMap;

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use shuttle_core::{
    split_chunks, CallHeader, Method, MultipleRequest, MultipleResponse, SingleRequest,
    SingleResponse, TransferId, Value, UNSET_ID,
};

use crate::channel::{FrameChannel, StreamChannel, TransportError};

/// Values packed into each outbound multiplex frame.
pub const VALUES_PER_FRAME: usize = 4;

/// What came back from a single-mode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleEcho {
    pub id: TransferId,
    pub data: Bytes,
}

/// Connects to a shuttle daemon, one TCP connection per call.
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
}

impl Client {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn open(&self, method: Method) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("failed to connect to shuttled at {}", self.addr))?;
        stream
            .write_all(&CallHeader::new(method).to_bytes())
            .await
            .context("failed to send call header")?;
        Ok(stream)
    }

    /// Stream `data` under `id` and wait for the echo.
    pub async fn single(&self, id: TransferId, data: &Bytes) -> Result<SingleEcho> {
        let stream = self.open(Method::Single).await?;
        let mut channel = StreamChannel::<_, SingleResponse, SingleRequest>::new(stream);

        send_single(&mut channel, id, data)
            .await
            .context("failed to send transfer")?;
        channel.close_send().await?;

        let echo = collect_single(&mut channel)
            .await
            .context("failed to receive echo")?;
        tracing::debug!(id = echo.id, bytes = echo.data.len(), "single echo received");
        Ok(echo)
    }

    /// Stream every item interleaved on one call and wait for all echoes.
    /// Every requested identifier appears in the result, empty ones included.
    pub async fn multiple(
        &self,
        items: &[(TransferId, Bytes)],
    ) -> Result<HashMap<TransferId, Bytes>> {
        let stream = self.open(Method::Multiple).await?;
        let mut channel = StreamChannel::<_, MultipleResponse, MultipleRequest>::new(stream);

        send_multiple(&mut channel, items)
            .await
            .context("failed to send transfers")?;
        channel.close_send().await?;

        let mut echoed = collect_multiple(&mut channel)
            .await
            .context("failed to receive echo")?;
        for (id, _) in items {
            echoed.entry(*id).or_default();
        }
        tracing::debug!(identifiers = echoed.len(), "multiple echo received");
        Ok(echoed)
    }
}

// ── Single mode ───────────────────────────────────────────────────────────────

/// Identifier frame first, then the data in chunk-sized frames.
pub async fn send_single<C>(
    channel: &mut C,
    id: TransferId,
    data: &Bytes,
) -> Result<(), TransportError>
where
    C: FrameChannel<Outbound = SingleRequest>,
{
    channel.send(SingleRequest::Id(id)).await?;
    for chunk in split_chunks(data) {
        channel.send(SingleRequest::Chunk(chunk)).await?;
    }
    Ok(())
}

/// Reassemble a single-mode echo, trusting only each chunk's declared bytes.
pub async fn collect_single<C>(channel: &mut C) -> Result<SingleEcho, TransportError>
where
    C: FrameChannel<Inbound = SingleResponse>,
{
    let mut id = UNSET_ID;
    let mut data = BytesMut::new();
    while let Some(frame) = channel.recv().await? {
        match frame {
            SingleResponse::Id(UNSET_ID) => {}
            SingleResponse::Id(n) => id = n,
            SingleResponse::Chunk(chunk) => data.extend_from_slice(&chunk.valid()),
        }
    }
    Ok(SingleEcho {
        id,
        data: data.freeze(),
    })
}

// ── Multiplex mode ────────────────────────────────────────────────────────────

/// Round-robin the items' chunks into frames of [`VALUES_PER_FRAME`] values.
/// Empty items are announced with a chunkless value so the server still
/// creates (and persists) them.
pub fn interleave(items: &[(TransferId, Bytes)]) -> Vec<MultipleRequest> {
    let mut values: Vec<Value> = items
        .iter()
        .filter(|(_, data)| data.is_empty())
        .map(|(id, _)| Value {
            id: *id,
            chunk: None,
        })
        .collect();

    let mut streams: Vec<_> = items
        .iter()
        .map(|(id, data)| (*id, split_chunks(data)))
        .collect();
    loop {
        let before = values.len();
        for (id, chunks) in streams.iter_mut() {
            if let Some(chunk) = chunks.next() {
                values.push(Value {
                    id: *id,
                    chunk: Some(chunk),
                });
            }
        }
        if values.len() == before {
            break;
        }
    }

    values
        .chunks(VALUES_PER_FRAME)
        .map(|batch| MultipleRequest {
            values: batch.to_vec(),
        })
        .collect()
}

pub async fn send_multiple<C>(
    channel: &mut C,
    items: &[(TransferId, Bytes)],
) -> Result<(), TransportError>
where
    C: FrameChannel<Outbound = MultipleRequest>,
{
    for frame in interleave(items) {
        channel.send(frame).await?;
    }
    Ok(())
}

/// Demultiplex an echo by identifier, trusting only declared bytes.
pub async fn collect_multiple<C>(
    channel: &mut C,
) -> Result<HashMap<TransferId, Bytes>, TransportError>
where
    C: FrameChannel<Inbound = MultipleResponse>,
{
    let mut buffers: HashMap<TransferId, BytesMut> = HashMap::new();
    while let Some(frame) = channel.recv().await? {
        for value in frame.values {
            let buffer = buffers.entry(value.id).or_default();
            if let Some(chunk) = value.chunk {
                buffer.extend_from_slice(&chunk.valid());
            }
        }
    }
    Ok(buffers
        .into_iter()
        .map(|(id, buffer)| (id, buffer.freeze()))
        .collect())
}
