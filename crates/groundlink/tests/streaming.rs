// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end: generator -> relay -> sessions -> client frames.

use futures::channel::mpsc;
use futures::StreamExt;
use groundlink::{
    decode, Category, CloseReason, Frame, Relay, SampleGenerator, Session, StreamConfig,
    Telemetry,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Client {
    _inbound: mpsc::UnboundedSender<Result<Frame, io::Error>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    task: tokio::task::JoinHandle<groundlink::SessionSummary>,
}

fn connect(relay: &Arc<Relay>, shutdown: &CancellationToken) -> Client {
    let (in_tx, in_rx) = mpsc::unbounded();
    let (out_tx, out_rx) = mpsc::unbounded();
    let session = Session::new(relay.clone(), shutdown.clone());
    Client {
        _inbound: in_tx,
        outbound: out_rx,
        task: tokio::spawn(session.run(in_rx, out_tx)),
    }
}

async fn receive_records(client: &mut Client, n: usize) -> Vec<Telemetry> {
    let mut records = Vec::with_capacity(n);
    while records.len() < n {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.outbound.next())
            .await
            .expect("frame in time")
            .expect("session open");
        match frame {
            Frame::Binary(bytes) => records.push(decode(&bytes).expect("valid frame")),
            other => panic!("Expected binary frame, got {:?}", other),
        }
    }
    records
}

#[tokio::test]
async fn test_generator_broadcasts_to_all_sessions() {
    let config = StreamConfig {
        sample_period_ms: 5,
        ..Default::default()
    };
    let relay = Arc::new(Relay::new(config.queue_capacity));
    let shutdown = CancellationToken::new();

    let mut a = connect(&relay, &shutdown);
    let mut b = connect(&relay, &shutdown);
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.session_count() != 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("sessions attached");

    let generator = SampleGenerator::from_config(&config).with_seed(11);
    let producer = tokio::spawn(generator.run(relay.clone(), shutdown.clone()));

    let from_a = receive_records(&mut a, 6).await;
    let from_b = receive_records(&mut b, 6).await;

    // Same ticks, same values, each delivered once per session.
    assert_eq!(from_a, from_b);
    let ticks: Vec<_> = from_a.iter().map(Telemetry::tick).collect();
    assert_eq!(ticks, vec![0, 1, 2, 3, 4, 5]);

    // Default rotation alternates orientation and position.
    assert_eq!(from_a[0].category(), Category::OrientationPosition);
    assert_eq!(from_a[1].category(), Category::Position);

    shutdown.cancel();
    assert!(producer.await.unwrap() >= 6);
    for client in [a, b] {
        let summary = client.task.await.unwrap();
        assert_eq!(summary.close_reason(), Some(CloseReason::Normal));
        assert!(summary.frames_sent >= 6);
    }
    assert_eq!(relay.session_count(), 0);
}

#[tokio::test]
async fn test_failed_client_does_not_affect_others() {
    let relay = Arc::new(Relay::new(0));
    let shutdown = CancellationToken::new();

    let broken = connect(&relay, &shutdown);
    let mut healthy = connect(&relay, &shutdown);
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.session_count() != 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("sessions attached");

    drop(broken.outbound);

    let generator = SampleGenerator::new(Duration::from_millis(5)).with_seed(5);
    let producer = tokio::spawn(generator.run(relay.clone(), shutdown.clone()));

    let summary = broken.task.await.unwrap();
    assert_eq!(summary.close_reason(), Some(CloseReason::Error));

    let records = receive_records(&mut healthy, 4).await;
    let ticks: Vec<_> = records.iter().map(Telemetry::tick).collect();
    assert_eq!(ticks, vec![0, 1, 2, 3]);
    assert_eq!(relay.session_count(), 1);

    shutdown.cancel();
    producer.await.unwrap();
    healthy.task.await.unwrap();
}
