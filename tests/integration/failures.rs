use crate::*;

use shuttle_core::{MultipleRequest, SingleRequest, SingleResponse, Value};
use shuttle_services::{FrameChannel, StreamChannel};

/// Garbage in place of the call header closes the connection without a
/// reply and leaves the server serving.
#[tokio::test]
async fn test_bad_preamble_rejected() -> Result<()> {
    let server = TestServer::start("fail-preamble").await?;

    let mut stream = TcpStream::connect(server.addr).await?;
    stream.write_all(b"GET / HT").await?;
    assert_eq!(read_until_closed(&mut stream).await, 0);

    let data = pattern(100, 1);
    let echo = server.client().single(1, &data).await?;
    assert_eq!(echo.data, data);
    assert_eq!(server.stored_files(), vec!["single_1.bin".to_string()]);

    server.stop().await
}

#[tokio::test]
async fn test_wrong_wire_version_rejected() -> Result<()> {
    let server = TestServer::start("fail-version").await?;

    let mut stream = TcpStream::connect(server.addr).await?;
    stream.write_all(b"SHTL\x09\x01\0\0").await?;
    assert_eq!(read_until_closed(&mut stream).await, 0);
    assert!(server.stored_files().is_empty());

    server.stop().await
}

/// Multiplex frames sent on a single-mode call abort it before anything
/// is persisted.
#[tokio::test]
async fn test_frame_kind_mismatch_aborts_call() -> Result<()> {
    let server = TestServer::start("fail-kind").await?;

    let stream = server.open_call(Method::Single).await?;
    let mut channel = StreamChannel::<_, SingleResponse, MultipleRequest>::new(stream);
    channel
        .send(MultipleRequest {
            values: vec![Value {
                id: 1,
                chunk: None,
            }],
        })
        .await?;

    let mut stream = channel.into_inner();
    assert_eq!(read_until_closed(&mut stream).await, 0);
    assert!(server.stored_files().is_empty());

    server.stop().await
}

/// A client that vanishes mid-frame gets nothing persisted.
#[tokio::test]
async fn test_disconnect_mid_frame_persists_nothing() -> Result<()> {
    let server = TestServer::start("fail-disconnect").await?;

    let stream = server.open_call(Method::Single).await?;
    let mut channel = StreamChannel::<_, SingleResponse, SingleRequest>::new(stream);
    channel.send(SingleRequest::Id(3)).await?;

    let mut stream = channel.into_inner();
    // First half of a frame header.
    stream.write_all(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00]).await?;
    stream.shutdown().await?;
    assert_eq!(read_until_closed(&mut stream).await, 0);
    assert!(server.stored_files().is_empty());

    server.stop().await
}

/// Shutdown waits for a call that finishes inside the grace period.
#[tokio::test]
async fn test_shutdown_lets_in_flight_call_finish() -> Result<()> {
    let server = TestServer::start("fail-shutdown").await?;

    let stream = server.open_call(Method::Single).await?;
    let mut channel = StreamChannel::<_, SingleResponse, SingleRequest>::new(stream);
    channel.send(SingleRequest::Id(12)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = tokio::spawn(server.stop());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let data = pattern(4000, 12);
    for chunk in shuttle_core::split_chunks(&data) {
        channel.send(SingleRequest::Chunk(chunk)).await?;
    }
    channel.close_send().await?;
    let mut echoed = Vec::new();
    while let Some(frame) = channel.recv().await? {
        if let SingleResponse::Chunk(c) = frame {
            echoed.extend_from_slice(&c.valid());
        }
    }
    assert_eq!(echoed, data.to_vec());

    stopping.await?
}
