use crate::*;

use shuttle_core::{single_key, SingleRequest, SingleResponse, CHUNK_SIZE};
use shuttle_services::client::send_single;
use shuttle_services::{FrameChannel, StreamChannel};

/// The 2248-byte transfer: persisted whole, echoed as an id frame and
/// chunks declaring 1024, 1024 and 200 bytes.
#[tokio::test]
async fn test_single_worked_example_over_tcp() -> Result<()> {
    let server = TestServer::start("single-worked").await?;
    let data = pattern(2248, 5);

    let stream = server.open_call(Method::Single).await?;
    let mut channel = StreamChannel::<_, SingleResponse, SingleRequest>::new(stream);
    send_single(&mut channel, 5, &data).await?;
    channel.close_send().await?;

    let mut frames = Vec::new();
    while let Some(frame) = channel.recv().await? {
        frames.push(frame);
    }

    assert_eq!(frames[0], SingleResponse::Id(5));
    let mut echoed = Vec::new();
    let mut positions = Vec::new();
    for frame in &frames[1..] {
        match frame {
            SingleResponse::Chunk(c) => {
                positions.push(c.position);
                echoed.extend_from_slice(&c.valid());
            }
            SingleResponse::Id(id) => panic!("unexpected identifier frame {id}"),
        }
    }
    assert_eq!(positions, vec![1024, 1024, 200]);
    assert_eq!(echoed, data.to_vec());
    assert_eq!(server.stored("single_5"), Some(data.to_vec()));

    server.stop().await
}

#[tokio::test]
async fn test_single_round_trip_sizes() -> Result<()> {
    let server = TestServer::start("single-sizes").await?;
    let client = server.client();

    for (id, len) in [(1, 0usize), (2, 1), (3, CHUNK_SIZE), (4, CHUNK_SIZE + 1), (5, 100_000)] {
        let data = pattern(len, id as u8);
        let echo = client.single(id, &data).await?;
        assert_eq!(echo.id, id, "len {len}");
        assert_eq!(echo.data, data, "len {len}");
        assert_eq!(server.stored(&single_key(id)), Some(data.to_vec()), "len {len}");
    }

    server.stop().await
}

/// Concurrent calls with distinct identifiers never see each other's bytes.
#[tokio::test]
async fn test_concurrent_single_streams_are_independent() -> Result<()> {
    let server = TestServer::start("single-concurrent").await?;

    let mut calls = Vec::new();
    for id in 1..=8i64 {
        let client = server.client();
        let data = pattern(3000 + id as usize * 501, id as u8);
        calls.push(tokio::spawn(async move {
            let echo = client.single(id, &data).await?;
            anyhow::Ok((id, data, echo))
        }));
    }

    for call in calls {
        let (id, data, echo) = call.await??;
        assert_eq!(echo.id, id);
        assert_eq!(echo.data, data, "id {id}");
        assert_eq!(server.stored(&single_key(id)), Some(data.to_vec()), "id {id}");
    }
    assert_eq!(server.stored_files().len(), 8);

    server.stop().await
}

#[tokio::test]
async fn test_single_same_identifier_last_write_wins() -> Result<()> {
    let server = TestServer::start("single-overwrite").await?;
    let client = server.client();

    client.single(9, &pattern(5000, 1)).await?;
    let second = pattern(700, 2);
    let echo = client.single(9, &second).await?;

    assert_eq!(echo.data, second);
    assert_eq!(server.stored("single_9"), Some(second.to_vec()));
    assert_eq!(server.stored_files(), vec!["single_9.bin".to_string()]);

    server.stop().await
}

/// A call that never names an identifier lands under `single_0`.
#[tokio::test]
async fn test_single_without_identifier_uses_zero_key() -> Result<()> {
    let server = TestServer::start("single-anonymous").await?;

    let stream = server.open_call(Method::Single).await?;
    let mut channel = StreamChannel::<_, SingleResponse, SingleRequest>::new(stream);
    let data = pattern(1500, 7);
    for chunk in shuttle_core::split_chunks(&data) {
        channel.send(SingleRequest::Chunk(chunk)).await?;
    }
    channel.close_send().await?;

    let mut first = None;
    while let Some(frame) = channel.recv().await? {
        first.get_or_insert(frame);
    }

    assert_eq!(first, Some(SingleResponse::Id(0)));
    assert_eq!(server.stored("single_0"), Some(data.to_vec()));

    server.stop().await
}
