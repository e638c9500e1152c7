//! ==============================================================================
//! runtime.rs - the poll loop
//! ==============================================================================
//!
//! purpose:
//!     ties the sensor reader to the reporters on a fixed cadence until the
//!     host is told to stop.
//!
//! one cycle:
//!
//!     ┌──────────────┐   Reading   ┌─────────┐   ┌────────┐
//!     │ read_co2     │ ──────────► │ console │ ► │ broker │   (in this order)
//!     │ (blocking    │             └─────────┘   └────────┘
//!     │  pool)       │
//!     └──────────────┘
//!            ▲                                        │
//!            └──────── Ticker (2s) ◄── shutdown? ─────┘
//!
//! states:
//!     Running  - from construction (setup is done by then)
//!     Stopped  - shutdown future resolved; checked between ticks and while
//!                the sensor read is in flight. a read that never returns
//!                hangs the loop, not the stop.
//!
//! relationships:
//!     - used by: main.rs
//!     - uses: sensor.rs (read_co2), report.rs (Reporter)
//!
//! ==============================================================================

use crate::domain::Reading;
use crate::hal::Co2Driver;
use crate::report::Reporter;
use crate::sensor;

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// fixed pause between the end of one cycle and the start of the next
#[derive(Clone, Copy, Debug)]
pub struct Ticker {
    period: Duration,
}

impl Ticker {
    pub fn every(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn tick(&self) {
        tokio::time::sleep(self.period).await;
    }
}

pub struct PollLoop<D> {
    /// lent to the blocking pool for the duration of each read
    driver: Option<D>,
    reporters: Vec<Box<dyn Reporter>>,
    ticker: Ticker,
    state: LoopState,
    cycles: u64,
}

impl<D: Co2Driver + 'static> PollLoop<D> {
    pub fn new(driver: D, reporters: Vec<Box<dyn Reporter>>, ticker: Ticker) -> Self {
        Self {
            driver: Some(driver),
            reporters,
            ticker,
            state: LoopState::Running,
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// read the sensor off the async threads; the loop still waits for it
    async fn poll_sensor(&mut self) -> Result<Reading> {
        let mut driver = self
            .driver
            .take()
            .ok_or_else(|| anyhow!("sensor driver lost in an earlier cycle"))?;

        let (driver, reading) = tokio::task::spawn_blocking(move || {
            let reading = sensor::read_co2(&mut driver);
            (driver, reading)
        })
        .await?;

        self.driver = Some(driver);
        Ok(reading)
    }

    /// true when the loop stopped while a sensor read was still blocked.
    /// that read keeps its blocking-pool thread until the driver returns.
    pub fn read_abandoned(&self) -> bool {
        self.driver.is_none()
    }

    fn report(&mut self, reading: &Reading) -> Result<()> {
        for reporter in &mut self.reporters {
            reporter.report(reading)?;
        }
        self.cycles += 1;
        Ok(())
    }

    /// run until `shutdown` resolves. only a failing fatal reporter
    /// (the console) ends the loop early, as an error.
    pub async fn run<F>(mut self, shutdown: F) -> Result<Self>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("[RUNTIME] Starting sensor polling ({}s interval)", self.ticker.period().as_secs_f32());

        loop {
            // a hung read must not make the host unstoppable
            let reading = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::warn!("[RUNTIME] ⚠ Stop requested during a sensor read, abandoning it");
                    break;
                }
                polled = self.poll_sensor() => polled?,
            };
            self.report(&reading)?;

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.ticker.tick() => {}
            }
        }

        self.state = LoopState::Stopped;
        tracing::info!("[RUNTIME] Stopped after {} cycles", self.cycles);
        Ok(self)
    }
}
