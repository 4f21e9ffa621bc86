// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic sample generator.
//!
//! Synthesizes one telemetry record per period, encodes it and hands the
//! message to a [`MessageSink`]. Values are random but stay within plausible
//! ranges for each field.

use crate::codec::{
    encode, Airspeed, BatteryVoltage, Category, FlightMode, Message, Orientation, Position,
    Telemetry, TickStamp,
};
use crate::config::StreamConfig;
use crate::queue::DeliveryQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

const GPS_LAT: f32 = 43.023_225;
const GPS_LNG: f32 = 7.434_523;
const LASER_RANGE: f32 = 99.123;
const FLIGHT_MODES: u32 = 5;

/// Destination for encoded messages.
pub trait MessageSink: Send + Sync {
    fn publish(&self, message: Message);
}

impl MessageSink for DeliveryQueue {
    fn publish(&self, message: Message) {
        self.enqueue(message);
    }
}

/// Periodic telemetry producer. The tick stamp is private to each instance.
#[derive(Debug)]
pub struct SampleGenerator {
    tick: TickStamp,
    period: Duration,
    categories: Vec<Category>,
    /// Index of the next category, independent of the tick.
    rotation: usize,
    rng: fastrand::Rng,
}

impl SampleGenerator {
    /// Generator emitting orientation and position samples alternately.
    pub fn new(period: Duration) -> Self {
        Self {
            tick: 0,
            period,
            categories: vec![Category::OrientationPosition, Category::Position],
            rotation: 0,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.sample_period())
            .with_start_tick(config.start_tick)
            .with_categories(config.categories.clone())
    }

    pub fn with_start_tick(mut self, tick: TickStamp) -> Self {
        self.tick = tick;
        self
    }

    /// Categories to cycle through. An empty list keeps the current rotation.
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        if !categories.is_empty() {
            self.categories = categories;
            self.rotation = 0;
        }
        self
    }

    /// Deterministic values, for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    /// Tick stamp the next sample will carry.
    pub fn tick(&self) -> TickStamp {
        self.tick
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Synthesize the next record and advance the tick (wrapping).
    pub fn next_sample(&mut self) -> Telemetry {
        let tick = self.tick;
        let category = self.categories[self.rotation];
        let record = self.synthesize(category, tick);
        self.rotation = (self.rotation + 1) % self.categories.len();
        self.tick = self.tick.wrapping_add(1);
        record
    }

    fn synthesize(&mut self, category: Category, tick: TickStamp) -> Telemetry {
        let rng = &mut self.rng;
        match category {
            Category::OrientationPosition => Orientation {
                tick,
                roll: 5.2 * rng.f32(),
                pitch: 3.421 * rng.f32(),
                yaw: 19.56 * rng.f32(),
            }
            .into(),
            Category::Position => Position {
                tick,
                altitude: 34.0 * rng.f32(),
                gps_lat: GPS_LAT,
                gps_lng: GPS_LNG,
                laser: LASER_RANGE,
            }
            .into(),
            Category::FlightMode => FlightMode {
                tick,
                mode: rng.u32(0..FLIGHT_MODES),
            }
            .into(),
            Category::BatteryVoltage => BatteryVoltage {
                tick,
                volts: 10.5 + 2.1 * rng.f32(),
            }
            .into(),
            Category::Airspeed => Airspeed {
                tick,
                meters_per_second: 40.0 * rng.f32(),
            }
            .into(),
        }
    }

    /// Publish one sample per period until `shutdown` fires.
    ///
    /// Returns the tick stamp the next sample would have carried.
    pub async fn run<S>(mut self, sink: Arc<S>, shutdown: CancellationToken) -> TickStamp
    where
        S: MessageSink + ?Sized,
    {
        info!(
            "Sample generator started (period {:?}, categories {:?})",
            self.period, self.categories
        );

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let record = self.next_sample();
                    let message = encode(&record);
                    trace!("Tick {} -> {} ({} bytes)", record.tick(), record.category(), message.len());
                    sink.publish(message);
                }
            }
        }

        debug!("Sample generator stopped at tick {}", self.tick);
        self.tick
    }
}
