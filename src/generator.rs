//! Fixed-cadence record producer.
//!
//! The generator schedules against absolute deadlines: each tick advances the
//! deadline by one interval before producing, then sleeps until it. A tick that
//! runs late does not push the following ones back, it only shortens (or skips)
//! the next sleep.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::{Range, RangeInclusive};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tick_core::{Record, RunSignal, Timestamp};
use tracing::{debug, trace};

use crate::queue::RecordQueue;

/// Default synthetic price range.
pub const DEFAULT_PRICE_RANGE: Range<f64> = 100.0..500.0;
/// Default synthetic volume range.
pub const DEFAULT_VOLUME_RANGE: RangeInclusive<i64> = 1..=1000;

/// Pushes one synthetic record onto the queue per interval.
pub struct Generator<R = StdRng> {
    queue: Arc<RecordQueue>,
    interval: Duration,
    price: Range<f64>,
    volume: RangeInclusive<i64>,
    rng: R,
}

impl Generator<StdRng> {
    /// Generator with the default ranges and an entropy-seeded RNG.
    pub fn new(queue: Arc<RecordQueue>, interval: Duration) -> Self {
        Self {
            queue,
            interval,
            price: DEFAULT_PRICE_RANGE,
            volume: DEFAULT_VOLUME_RANGE,
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng> Generator<R> {
    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Generator<R2> {
        Generator {
            queue: self.queue,
            interval: self.interval,
            price: self.price,
            volume: self.volume,
            rng,
        }
    }

    /// Prices are drawn uniformly from `[min, max)`.
    pub fn with_price_range(mut self, price: Range<f64>) -> Self {
        self.price = price;
        self
    }

    /// Volumes are drawn uniformly from `[min, max]`.
    pub fn with_volume_range(mut self, volume: RangeInclusive<i64>) -> Self {
        self.volume = volume;
        self
    }

    /// Produce one record stamped with the current time.
    pub fn next_record(&mut self) -> Record {
        let price = if self.price.is_empty() {
            self.price.start
        } else {
            self.rng.gen_range(self.price.clone())
        };
        let volume = if self.volume.is_empty() {
            *self.volume.start()
        } else {
            self.rng.gen_range(self.volume.clone())
        };
        Record::new(price, volume, Timestamp::now())
    }

    /// Generate until `signal` stops; returns the number of records pushed.
    pub fn run(mut self, signal: &RunSignal) -> u64 {
        debug!(interval_ms = self.interval.as_millis() as u64, "Generator started");

        let mut generated = 0u64;
        let mut deadline = Instant::now();
        while signal.is_running() {
            deadline += self.interval;
            let record = self.next_record();
            self.queue.push(record);
            generated += 1;

            let now = Instant::now();
            if deadline > now {
                if signal.wait_timeout(deadline - now) {
                    break;
                }
            } else {
                trace!(behind_us = (now - deadline).as_micros() as u64, "Generator behind schedule");
            }
        }

        debug!(generated, "Generator stopped");
        generated
    }
}
