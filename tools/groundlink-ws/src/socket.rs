// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Adapter between axum WebSockets and groundlink sessions.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{future, SinkExt, StreamExt};
use groundlink::{Frame, Session, SessionSummary};

/// Run `session` over an upgraded WebSocket until it closes.
pub async fn serve(session: Session, socket: WebSocket) -> SessionSummary {
    let (ws_tx, ws_rx) = socket.split();

    let inbound = ws_rx.map(|msg| msg.map(into_frame));
    let outbound =
        ws_tx.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(from_frame(frame))));

    session.run(inbound, outbound).await
}

pub fn into_frame(msg: Message) -> Frame {
    match msg {
        Message::Binary(data) => Frame::Binary(data),
        Message::Text(text) => Frame::Text(text),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(_) => Frame::Close,
    }
}

pub fn from_frame(frame: Frame) -> Message {
    match frame {
        Frame::Binary(data) => Message::Binary(data),
        Frame::Text(text) => Message::Text(text),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close => Message::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: "server shutting down".into(),
        })),
    }
}
