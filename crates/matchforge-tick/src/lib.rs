//! Fixed-rate tick loop for Matchforge.
//!
//! Drives the once-per-second room sweep (and anything else that wants
//! a steady heartbeat). Missed ticks are skipped rather than replayed,
//! so a long sweep never causes a burst of catch-up ticks. An optional
//! jitter spreads the work of several loops so they do not all fire on
//! the same instant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::MissedTickBehavior;

/// Pauses and resumes a running [`TickLoop`] from outside.
#[derive(Clone, Default)]
pub struct PauseHandle {
    paused: Arc<AtomicBool>,
}

impl PauseHandle {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

/// A steady heartbeat with skip-on-overrun semantics.
pub struct TickLoop {
    period: Duration,
    jitter: Duration,
    pause: PauseHandle,
}

impl TickLoop {
    /// A loop firing `rate_hz` times per second.
    pub fn new(rate_hz: u32) -> Self {
        let rate = rate_hz.max(1);
        Self {
            period: Duration::from_micros(1_000_000 / u64::from(rate)),
            jitter: Duration::ZERO,
            pause: PauseHandle::default(),
        }
    }

    pub fn from_period(period: Duration) -> Self {
        Self {
            period,
            jitter: Duration::ZERO,
            pause: PauseHandle::default(),
        }
    }

    /// Delays each tick by a random amount up to `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    /// Runs until `on_tick` returns `false`. Paused ticks are consumed
    /// without invoking the callback.
    pub async fn run<F>(self, mut on_tick: F)
    where
        F: FnMut() -> bool,
    {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; swallow
        // it so the loop starts one period in.
        interval.tick().await;
        loop {
            interval.tick().await;
            if self.pause.is_paused() {
                continue;
            }
            if !self.jitter.is_zero() {
                let extra = rand::thread_rng().gen_range(Duration::ZERO..=self.jitter);
                tokio::time::sleep(extra).await;
            }
            if !on_tick() {
                tracing::debug!("tick loop stopped by callback");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn fires_at_the_configured_rate() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let task = tokio::spawn(TickLoop::new(1).run(move || {
            counter.fetch_add(1, Ordering::Relaxed) < 4
        }));
        tokio::time::sleep(Duration::from_secs(10)).await;
        task.await.unwrap();
        assert_eq!(ticks.load(Ordering::Relaxed), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_loop_skips_the_callback() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let looper = TickLoop::new(1);
        let pause = looper.pause_handle();
        pause.pause();
        tokio::spawn(looper.run(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            true
        }));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::Relaxed), 0);

        pause.resume();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(ticks.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callbacks_do_not_burst() {
        // A callback that blocks virtual time for three periods should
        // not be called three extra times to catch up.
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        tokio::spawn(async move {
            let looper = TickLoop::new(1);
            let mut interval_count = 0u32;
            looper
                .run(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                    interval_count += 1;
                    interval_count < 100
                })
                .await;
        });
        tokio::time::sleep(Duration::from_secs(3)).await;
        let before = ticks.load(Ordering::Relaxed);
        // Stall the loop by advancing time in one jump.
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        let after = ticks.load(Ordering::Relaxed);
        assert!(after <= before + 2, "burst of {} catch-up ticks", after - before);
    }
}
