use crate::*;

use std::collections::HashMap;

use shuttle_core::{chunk_count, multiple_key, MultipleRequest, MultipleResponse, TransferId};
use shuttle_services::client::send_multiple;
use shuttle_services::{FrameChannel, StreamChannel};

#[tokio::test]
async fn test_multiplexed_transfer_round_trip() -> Result<()> {
    let server = TestServer::start("multiple-round-trip").await?;
    let items: Vec<(TransferId, Bytes)> = vec![
        (1, pattern(2248, 1)),
        (2, pattern(1024, 2)),
        (3, pattern(17, 3)),
        (4, pattern(40_000, 4)),
        (5, Bytes::new()),
    ];

    let echoed = server.client().multiple(&items).await?;

    assert_eq!(echoed.len(), items.len());
    for (id, data) in &items {
        assert_eq!(echoed[id], *data, "id {id}");
        assert_eq!(server.stored(&multiple_key(*id)), Some(data.to_vec()), "id {id}");
    }

    server.stop().await
}

/// Every echo frame carries exactly one value, and every chunk but the last
/// of each identifier is full.
#[tokio::test]
async fn test_multiplexed_echo_framing() -> Result<()> {
    let server = TestServer::start("multiple-framing").await?;
    let items: Vec<(TransferId, Bytes)> = vec![(10, pattern(3000, 1)), (20, pattern(1025, 2))];

    let stream = server.open_call(Method::Multiple).await?;
    let mut channel = StreamChannel::<_, MultipleResponse, MultipleRequest>::new(stream);
    send_multiple(&mut channel, &items).await?;
    channel.close_send().await?;

    let mut frames = Vec::new();
    while let Some(frame) = channel.recv().await? {
        frames.push(frame);
    }

    assert!(frames.iter().all(|f| f.values.len() == 1));
    let expected: usize = items.iter().map(|(_, d)| chunk_count(d.len())).sum();
    assert_eq!(frames.len(), expected);

    let mut positions: HashMap<TransferId, Vec<i64>> = HashMap::new();
    for frame in &frames {
        let value = &frame.values[0];
        let chunk = value.chunk.as_ref().context("echo value without chunk")?;
        assert_eq!(chunk.position as usize, chunk.data.len());
        positions.entry(value.id).or_default().push(chunk.position);
    }
    assert_eq!(positions[&10], vec![1024, 1024, 952]);
    assert_eq!(positions[&20], vec![1024, 1]);

    server.stop().await
}

/// Multiplexed and single calls running at once keep their data apart,
/// even when they use the same numeric identifiers.
#[tokio::test]
async fn test_concurrent_multiplexed_and_single_calls() -> Result<()> {
    let server = TestServer::start("multiple-concurrent").await?;

    let multiplexed = {
        let client = server.client();
        let items: Vec<(TransferId, Bytes)> =
            (1..=4).map(|id| (id, pattern(2000 * id as usize, id as u8))).collect();
        tokio::spawn(async move {
            let echoed = client.multiple(&items).await?;
            anyhow::Ok((items, echoed))
        })
    };
    let singles: Vec<_> = (1..=4i64)
        .map(|id| {
            let client = server.client();
            let data = pattern(1500 + id as usize, 100 + id as u8);
            tokio::spawn(async move {
                let echo = client.single(id, &data).await?;
                anyhow::Ok((id, data, echo))
            })
        })
        .collect();

    let (items, echoed) = multiplexed.await??;
    for (id, data) in &items {
        assert_eq!(echoed[id], *data);
        assert_eq!(server.stored(&multiple_key(*id)), Some(data.to_vec()));
    }
    for call in singles {
        let (id, data, echo) = call.await??;
        assert_eq!(echo.data, data);
        assert_eq!(server.stored(&format!("single_{id}")), Some(data.to_vec()));
    }
    assert_eq!(server.stored_files().len(), 8);

    server.stop().await
}
