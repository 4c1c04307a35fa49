//! Duplex frame channels.
//!
//! A channel yields inbound frames until the peer finishes sending, then
//! `recv` returns `Ok(None)`. That graceful end is the only non-error way a
//! receive phase completes.

use std::future::Future;
use std::marker::PhantomData;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use shuttle_core::message::Frame;
use shuttle_core::wire::{FrameHeader, WireError, FRAME_HEADER_SIZE};

/// One end of a duplex stream of frames.
pub trait FrameChannel: Send {
    type Inbound: Send;
    type Outbound: Send;

    /// Next inbound frame, or `None` once the peer has finished sending.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Inbound>, TransportError>> + Send;

    /// Queue one outbound frame.
    fn send(
        &mut self,
        frame: Self::Outbound,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

// ── Stream channel ────────────────────────────────────────────────────────────

/// Frame channel over a byte stream (a TCP connection in production).
pub struct StreamChannel<S, In, Out> {
    io: S,
    _frames: PhantomData<fn(Out) -> In>,
}

impl<S, In, Out> StreamChannel<S, In, Out>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: S) -> Self {
        Self {
            io,
            _frames: PhantomData,
        }
    }

    /// Half-close the write side. The peer's next `recv` after the frames
    /// already written returns `Ok(None)`.
    pub async fn close_send(&mut self) -> Result<(), TransportError> {
        self.io.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}

impl<S, In, Out> FrameChannel for StreamChannel<S, In, Out>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    In: Frame + Send,
    Out: Frame + Send,
{
    type Inbound = In;
    type Outbound = Out;

    async fn recv(&mut self) -> Result<Option<In>, TransportError> {
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        if !read_or_eof(&mut self.io, &mut raw).await? {
            return Ok(None);
        }
        let header = FrameHeader::parse(&raw, In::KIND)?;

        let mut body = vec![0u8; header.body_len()];
        self.io.read_exact(&mut body).await.map_err(mid_frame)?;

        Ok(Some(In::decode(&header, Bytes::from(body))?))
    }

    async fn send(&mut self, frame: Out) -> Result<(), TransportError> {
        let bytes = frame.encode()?;
        self.io.write_all(&bytes).await?;
        Ok(())
    }
}

/// Fill `buf` completely. Returns `false` if the stream ended before the
/// first byte; ending part-way through is an error.
async fn read_or_eof<R>(io: &mut R, buf: &mut [u8]) -> Result<bool, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = io.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(TransportError::ClosedMidFrame);
        }
        filled += n;
    }
    Ok(true)
}

fn mid_frame(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::ClosedMidFrame
    } else {
        TransportError::Io(e)
    }
}

// ── Memory channel ────────────────────────────────────────────────────────────

/// In-process frame channel, one end of a [`memory_pair`].
pub struct MemoryChannel<In, Out> {
    rx: mpsc::UnboundedReceiver<Result<In, TransportError>>,
    tx: Option<mpsc::UnboundedSender<Result<Out, TransportError>>>,
}

/// Two connected channel ends. Frames sent on one arrive on the other.
pub fn memory_pair<A, B>() -> (MemoryChannel<A, B>, MemoryChannel<B, A>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            rx: a_rx,
            tx: Some(b_tx),
        },
        MemoryChannel {
            rx: b_rx,
            tx: Some(a_tx),
        },
    )
}

impl<In, Out> MemoryChannel<In, Out> {
    /// Stop sending. The peer sees graceful end-of-input once it has
    /// drained what was already sent.
    pub fn close_send(&mut self) {
        self.tx = None;
    }

    /// Make the peer's next `recv` (after already-queued frames) fail with
    /// `error`, as a dropped connection would.
    pub fn fail_peer(&mut self, error: TransportError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }
}

impl<In, Out> FrameChannel for MemoryChannel<In, Out>
where
    In: Send,
    Out: Send,
{
    type Inbound = In;
    type Outbound = Out;

    async fn recv(&mut self) -> Result<Option<In>, TransportError> {
        self.rx.recv().await.transpose()
    }

    async fn send(&mut self, frame: Out) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Ok(frame)).map_err(|_| TransportError::Closed)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure to receive or send a frame. Graceful end-of-input is not one.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame: {0}")]
    Wire(#[from] WireError),

    #[error("connection closed mid-frame")]
    ClosedMidFrame,

    #[error("channel closed by peer")]
    Closed,
}
