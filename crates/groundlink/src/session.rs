// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client streaming session.
//!
//! Each accepted connection gets a [`Session`] that:
//! - Attaches a private queue to the [`Relay`]
//! - Writes every queued message to the client as a binary frame
//! - Decodes and logs inbound frames from the client
//!
//! The session is transport-agnostic: it reads [`Frame`]s from any `Stream`
//! and writes them to any `Sink`. Transport halves and the relay
//! subscription are owned by [`Session::run`], so they are released on every
//! exit path.

use crate::codec::decode;
use crate::queue::DeliveryQueue;
use crate::relay::Relay;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound on the best-effort close frame sent at shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Errors that terminate a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("transport read error: {0}")]
    TransportRead(String),

    #[error("transport write error: {0}")]
    TransportWrite(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    Error,
}

/// Session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Upgraded,
    Streaming,
    Closed(CloseReason),
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Upgraded)
                | (Connecting, Closed(_))
                | (Upgraded, Streaming)
                | (Upgraded, Closed(_))
                | (Streaming, Closed(_))
        )
    }

    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Upgraded => write!(f, "upgraded"),
            Self::Streaming => write!(f, "streaming"),
            Self::Closed(CloseReason::Normal) => write!(f, "closed"),
            Self::Closed(CloseReason::Error) => write!(f, "closed (error)"),
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    /// Always `Closed`.
    pub state: SessionState,
    pub error: Option<SessionError>,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub decode_errors: u64,
}

impl SessionSummary {
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A streaming client session
pub struct Session {
    id: String,
    state: SessionState,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
    frames_sent: u64,
    frames_received: u64,
    decode_errors: u64,
}

impl Session {
    /// Create a session for a connection whose handshake is in progress.
    pub fn new(relay: Arc<Relay>, shutdown: CancellationToken) -> Self {
        let id = Uuid::new_v4().to_string()[..8].to_string();
        debug!("[{}] New session created", id);

        Self {
            id,
            state: SessionState::Connecting,
            relay,
            shutdown,
            frames_sent: 0,
            frames_received: 0,
            decode_errors: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stream until the client leaves, a transport error occurs or shutdown
    /// is requested. Call once the handshake has succeeded.
    pub async fn run<R, W, E>(mut self, inbound: R, outbound: W) -> SessionSummary
    where
        R: Stream<Item = Result<Frame, E>>,
        E: fmt::Display,
        W: Sink<Frame>,
        W::Error: fmt::Display,
    {
        tokio::pin!(inbound);
        tokio::pin!(outbound);

        self.transition(SessionState::Upgraded);
        let subscription = self.relay.attach(self.id.clone());
        self.transition(SessionState::Streaming);
        info!(
            "[{}] Streaming ({} sessions attached)",
            self.id,
            self.relay.session_count()
        );

        let result = self
            .stream(subscription.queue(), inbound.as_mut(), outbound.as_mut())
            .await;
        drop(subscription);

        let reason = match &result {
            Ok(()) => CloseReason::Normal,
            Err(e) => {
                error!("[{}] Session error: {}", self.id, e);
                CloseReason::Error
            }
        };
        self.transition(SessionState::Closed(reason));

        info!(
            "[{}] Session ended ({} sent, {} received, {} undecodable)",
            self.id, self.frames_sent, self.frames_received, self.decode_errors
        );
        self.summary(result.err())
    }

    async fn stream<R, W, E>(
        &mut self,
        queue: &DeliveryQueue,
        mut inbound: Pin<&mut R>,
        mut outbound: Pin<&mut W>,
    ) -> Result<(), SessionError>
    where
        R: Stream<Item = Result<Frame, E>>,
        E: fmt::Display,
        W: Sink<Frame>,
        W::Error: fmt::Display,
    {
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.close(outbound.as_mut()).await;
                    return Ok(());
                }

                frame = inbound.next() => {
                    match frame {
                        None => {
                            info!("[{}] Client disconnected", self.id);
                            return Ok(());
                        }
                        Some(Ok(Frame::Close)) => {
                            info!("[{}] Client closed connection", self.id);
                            return Ok(());
                        }
                        Some(Ok(frame)) => self.handle_inbound(frame),
                        Some(Err(e)) => return Err(SessionError::TransportRead(e.to_string())),
                    }
                }

                _ = queue.notified() => {}
            }

            // A stalled client must not hold the session past shutdown.
            let drained = tokio::select! {
                biased;
                _ = shutdown.cancelled() => false,
                result = self.drain(queue, outbound.as_mut()) => {
                    result?;
                    true
                }
            };
            if !drained {
                self.close(outbound.as_mut()).await;
                return Ok(());
            }
        }
    }

    /// Send a close frame, giving up after [`CLOSE_TIMEOUT`].
    async fn close<W>(&self, mut outbound: Pin<&mut W>)
    where
        W: Sink<Frame>,
        W::Error: fmt::Display,
    {
        info!("[{}] Shutdown requested, closing", self.id);
        match tokio::time::timeout(CLOSE_TIMEOUT, outbound.send(Frame::Close)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("[{}] Close frame not sent: {}", self.id, e),
            Err(_) => debug!("[{}] Close frame timed out", self.id),
        }
    }

    /// Write every queued message. A failed write ends the session.
    async fn drain<W>(
        &mut self,
        queue: &DeliveryQueue,
        mut outbound: Pin<&mut W>,
    ) -> Result<(), SessionError>
    where
        W: Sink<Frame>,
        W::Error: fmt::Display,
    {
        let mut pending = false;
        while let Some(message) = queue.dequeue() {
            outbound
                .feed(Frame::Binary(message.to_vec()))
                .await
                .map_err(|e| SessionError::TransportWrite(e.to_string()))?;
            self.frames_sent += 1;
            pending = true;
        }

        if pending {
            outbound
                .flush()
                .await
                .map_err(|e| SessionError::TransportWrite(e.to_string()))?;
        }
        Ok(())
    }

    fn handle_inbound(&mut self, frame: Frame) {
        match frame {
            Frame::Binary(bytes) => {
                self.frames_received += 1;
                match decode(&bytes) {
                    Ok(record) => debug!(
                        "[{}] Received {} tick {}: {:?}",
                        self.id,
                        record.category(),
                        record.tick(),
                        record
                    ),
                    Err(e) => {
                        self.decode_errors += 1;
                        warn!("[{}] Dropping inbound frame: {}", self.id, e);
                    }
                }
            }
            Frame::Text(text) => {
                self.frames_received += 1;
                info!("[{}] Client message: {}", self.id, text);
            }
            Frame::Ping(_) | Frame::Pong(_) => {
                debug!("[{}] Keepalive", self.id);
            }
            Frame::Close => {}
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn summary(&self, error: Option<SessionError>) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            state: self.state,
            error,
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
            decode_errors: self.decode_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, FlightMode, Message, Orientation};
    use futures::channel::mpsc;
    use std::io;
    use std::task::{Context, Poll};
    use tokio::task::JoinHandle;

    /// Client that stopped reading: writes never complete.
    struct StalledSink;

    impl Sink<Frame> for StalledSink {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Frame) -> Result<(), io::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Client {
        inbound: mpsc::UnboundedSender<Result<Frame, io::Error>>,
        outbound: mpsc::UnboundedReceiver<Frame>,
        task: JoinHandle<SessionSummary>,
    }

    fn connect(relay: &Arc<Relay>, shutdown: &CancellationToken) -> Client {
        let (in_tx, in_rx) = mpsc::unbounded();
        let (out_tx, out_rx) = mpsc::unbounded();
        let session = Session::new(relay.clone(), shutdown.clone());
        assert_eq!(session.state(), SessionState::Connecting);

        Client {
            inbound: in_tx,
            outbound: out_rx,
            task: tokio::spawn(session.run(in_rx, out_tx)),
        }
    }

    async fn wait_attached(relay: &Relay, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while relay.session_count() != n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("sessions attached");
    }

    async fn next_frame(client: &mut Client) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), client.outbound.next())
            .await
            .expect("frame in time")
            .expect("stream open")
    }

    fn sample(tick: u32) -> Message {
        encode(
            &Orientation {
                tick,
                roll: 1.0,
                pitch: 2.0,
                yaw: 3.0,
            }
            .into(),
        )
    }

    #[test]
    fn test_state_transitions() {
        use SessionState::*;
        assert!(Connecting.can_transition_to(Upgraded));
        assert!(Upgraded.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Closed(CloseReason::Normal)));
        assert!(Streaming.can_transition_to(Closed(CloseReason::Error)));
        assert!(Connecting.can_transition_to(Closed(CloseReason::Error)));

        assert!(!Connecting.can_transition_to(Streaming));
        assert!(!Streaming.can_transition_to(Upgraded));
        assert!(!Closed(CloseReason::Normal).can_transition_to(Streaming));
        assert!(!Closed(CloseReason::Error).can_transition_to(Closed(CloseReason::Normal)));

        assert!(Closed(CloseReason::Error).is_closed());
        assert!(!Streaming.is_closed());
    }

    #[tokio::test]
    async fn test_every_session_receives_every_message() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let mut a = connect(&relay, &shutdown);
        let mut b = connect(&relay, &shutdown);
        wait_attached(&relay, 2).await;

        let msg = sample(1);
        relay.publish(msg.clone());

        assert_eq!(next_frame(&mut a).await, Frame::Binary(msg.to_vec()));
        assert_eq!(next_frame(&mut b).await, Frame::Binary(msg.to_vec()));

        drop(a.inbound);
        drop(b.inbound);
        let sa = a.task.await.unwrap();
        let sb = b.task.await.unwrap();

        assert_eq!(sa.close_reason(), Some(CloseReason::Normal));
        assert_eq!(sa.frames_sent, 1);
        assert_eq!(sb.frames_sent, 1);
        assert_eq!(relay.session_count(), 0);
    }

    #[tokio::test]
    async fn test_messages_delivered_in_production_order() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let mut client = connect(&relay, &shutdown);
        wait_attached(&relay, 1).await;

        for tick in 0..5 {
            relay.publish(sample(tick));
        }
        for tick in 0..5 {
            assert_eq!(
                next_frame(&mut client).await,
                Frame::Binary(sample(tick).to_vec())
            );
        }

        shutdown.cancel();
        let summary = client.task.await.unwrap();
        assert_eq!(summary.frames_sent, 5);
    }

    #[tokio::test]
    async fn test_write_failure_closes_session_and_detaches() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let client = connect(&relay, &shutdown);
        wait_attached(&relay, 1).await;

        // Client can no longer receive.
        drop(client.outbound);
        relay.publish(sample(1));

        let summary = client.task.await.unwrap();
        assert_eq!(summary.close_reason(), Some(CloseReason::Error));
        assert!(matches!(
            summary.error,
            Some(SessionError::TransportWrite(_))
        ));
        assert_eq!(relay.session_count(), 0);
    }

    #[tokio::test]
    async fn test_read_error_closes_session() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let client = connect(&relay, &shutdown);
        wait_attached(&relay, 1).await;

        client
            .inbound
            .unbounded_send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
            .unwrap();

        let summary = client.task.await.unwrap();
        assert_eq!(summary.state, SessionState::Closed(CloseReason::Error));
        assert_eq!(
            summary.error,
            Some(SessionError::TransportRead("reset".into()))
        );
        assert_eq!(relay.session_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_inbound_frame_does_not_close() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let mut client = connect(&relay, &shutdown);
        wait_attached(&relay, 1).await;

        let good = encode(&FlightMode { tick: 2, mode: 1 }.into());
        client
            .inbound
            .unbounded_send(Ok(Frame::Binary(vec![0xFF, 0, 0, 0, 0])))
            .unwrap();
        client
            .inbound
            .unbounded_send(Ok(Frame::Binary(vec![0x00, 1, 0, 0, 0])))
            .unwrap();
        client
            .inbound
            .unbounded_send(Ok(Frame::Binary(good.to_vec())))
            .unwrap();
        client
            .inbound
            .unbounded_send(Ok(Frame::Text("hello".into())))
            .unwrap();

        // Still streaming after the bad frames.
        relay.publish(sample(3));
        assert_eq!(
            next_frame(&mut client).await,
            Frame::Binary(sample(3).to_vec())
        );

        client.inbound.unbounded_send(Ok(Frame::Close)).unwrap();
        let summary = client.task.await.unwrap();

        assert_eq!(summary.close_reason(), Some(CloseReason::Normal));
        assert_eq!(summary.frames_received, 4);
        assert_eq!(summary.decode_errors, 2);
        assert!(summary.error.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_and_detaches() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let mut client = connect(&relay, &shutdown);
        wait_attached(&relay, 1).await;

        shutdown.cancel();

        assert_eq!(next_frame(&mut client).await, Frame::Close);
        let summary = client.task.await.unwrap();
        assert_eq!(summary.close_reason(), Some(CloseReason::Normal));
        assert_eq!(relay.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_client_stalled() {
        let relay = Arc::new(Relay::new(0));
        let shutdown = CancellationToken::new();
        let (_in_tx, in_rx) = mpsc::unbounded::<Result<Frame, io::Error>>();
        let task = tokio::spawn(Session::new(relay.clone(), shutdown.clone()).run(in_rx, StalledSink));
        wait_attached(&relay, 1).await;

        relay.publish(sample(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session ends after shutdown")
            .unwrap();
        assert_eq!(summary.close_reason(), Some(CloseReason::Normal));
        assert_eq!(summary.frames_sent, 0);
        assert_eq!(relay.session_count(), 0);
    }
}
