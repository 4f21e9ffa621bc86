// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Groundlink - binary flight-telemetry streaming core
//!
//! Streams periodic telemetry samples to browser clients using a compact,
//! category-tagged binary wire format.
//!
//! # Components
//!
//! - **Codec**: fixed-layout packet encoding/decoding
//! - **Delivery Queue**: per-session FIFO with wake-up notification
//! - **Relay**: fan-out of every message to every attached session
//! - **Generator**: periodic sample producer
//! - **Session**: per-connection streaming state machine
//!
//! # Wire Format
//!
//! ```text
//! [category: u8][tick: u32 LE][payload fields: 4 bytes LE each]
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use groundlink::{Relay, SampleGenerator, StreamConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let config = StreamConfig::default();
//! let relay = Arc::new(Relay::new(config.queue_capacity));
//! let shutdown = CancellationToken::new();
//!
//! let generator = SampleGenerator::from_config(&config);
//! tokio::spawn(generator.run(relay.clone(), shutdown.clone()));
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod generator;
pub mod queue;
pub mod relay;
pub mod session;

pub use codec::{
    decode, encode, Airspeed, BatteryVoltage, Category, CodecError, FlightMode, Message,
    Orientation, Position, Telemetry, TickStamp,
};
pub use config::{ConfigError, StreamConfig};
pub use generator::{MessageSink, SampleGenerator};
pub use queue::DeliveryQueue;
pub use relay::{Relay, RelayStats, RelayStatsSnapshot, Subscription};
pub use session::{
    CloseReason, Frame, Session, SessionError, SessionState, SessionSummary,
};
