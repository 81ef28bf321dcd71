use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::utils::{clock::Clock, time::same_day};

/// One polling monitor driven by [MonitorLoop]: sample every tick, persist
/// when the flush gate opens.
#[async_trait]
pub trait Monitor: Send {
    /// Called once per poll interval. Transient sample failures should be
    /// returned as errors; the loop logs them and skips the tick.
    async fn tick(&mut self, now: DateTime<Local>) -> Result<()>;

    /// Whether buffered data justifies a budget flush. Day-boundary flushes
    /// run regardless.
    fn has_pending(&self) -> bool {
        true
    }

    /// Ingests accumulated data and persists the resulting records.
    async fn flush(&mut self, now: DateTime<Local>, reason: FlushReason) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The flush interval elapsed since the last flush.
    Budget,
    /// A calendar day boundary fell inside the last poll interval.
    DayBoundary,
    /// The process is shutting down.
    Shutdown,
}

/// Emission policy bounding write volume: flush when the budget elapses or a
/// day boundary was crossed since the previous tick, whichever happens
/// first. Checking the boundary against `now - poll_interval` guarantees no
/// day transition is missed even with a large flush interval.
pub struct FlushGate {
    poll_interval: chrono::Duration,
    flush_interval: chrono::Duration,
    last_flush: DateTime<Local>,
}

impl FlushGate {
    pub fn new(poll_interval: Duration, flush_interval: Duration, start: DateTime<Local>) -> Self {
        Self {
            poll_interval: chrono::Duration::from_std(poll_interval)
                .expect("poll interval out of range"),
            flush_interval: chrono::Duration::from_std(flush_interval)
                .expect("flush interval out of range"),
            last_flush: start,
        }
    }

    pub fn due(&self, now: DateTime<Local>) -> Option<FlushReason> {
        if !same_day(now - self.poll_interval, now) {
            Some(FlushReason::DayBoundary)
        } else if now >= self.last_flush + self.flush_interval {
            Some(FlushReason::Budget)
        } else {
            None
        }
    }

    pub fn mark(&mut self, now: DateTime<Local>) {
        self.last_flush = now;
    }
}

/// The polling event loop shared by every monitor. Single logical thread of
/// control: one blocking sleep per tick, cooperative shutdown through the
/// cancellation token, best-effort final flush on the way out.
pub struct MonitorLoop<M> {
    monitor: M,
    gate: FlushGate,
    poll_interval: Duration,
    clock: Box<dyn Clock>,
    shutdown: CancellationToken,
}

impl<M: Monitor> MonitorLoop<M> {
    pub fn new(
        monitor: M,
        poll_interval: Duration,
        flush_interval: Duration,
        clock: Box<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        let gate = FlushGate::new(poll_interval, flush_interval, clock.now());
        Self {
            monitor,
            gate,
            poll_interval,
            clock,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.poll_interval;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down, performing final flush");
                    let now = self.clock.now();
                    if let Err(e) = self.monitor.flush(now, FlushReason::Shutdown).await {
                        warn!("Final flush failed {e:?}");
                    }
                    return Ok(());
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }

            let now = self.clock.now();
            if let Err(e) = self.monitor.tick(now).await {
                // Transient sample failure: skip the tick, keep polling.
                error!("Encountered an error during collection {:?}", e);
                continue;
            }

            match self.gate.due(now) {
                None => continue,
                Some(FlushReason::Budget) if !self.monitor.has_pending() => continue,
                Some(reason) => {
                    self.gate.mark(now);
                    debug!("Flushing ({reason:?})");
                    // A persistence failure ends the loop and surfaces to the
                    // caller.
                    self.monitor.flush(now, reason).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use std::time::Duration;

    use crate::utils::time::parse_stamp;

    use super::{FlushGate, FlushReason};

    const POLL: Duration = Duration::from_secs(10);
    const FLUSH: Duration = Duration::from_secs(600);

    #[test]
    fn test_gate_waits_for_budget() -> Result<()> {
        let start = parse_stamp("2024-03-01 10:00:00")?;
        let gate = FlushGate::new(POLL, FLUSH, start);

        assert_eq!(gate.due(parse_stamp("2024-03-01 10:00:10")?), None);
        assert_eq!(gate.due(parse_stamp("2024-03-01 10:09:50")?), None);
        assert_eq!(
            gate.due(parse_stamp("2024-03-01 10:10:00")?),
            Some(FlushReason::Budget)
        );
        Ok(())
    }

    #[test]
    fn test_gate_mark_restarts_budget() -> Result<()> {
        let start = parse_stamp("2024-03-01 10:00:00")?;
        let mut gate = FlushGate::new(POLL, FLUSH, start);

        gate.mark(parse_stamp("2024-03-01 10:10:00")?);
        assert_eq!(gate.due(parse_stamp("2024-03-01 10:15:00")?), None);
        assert_eq!(
            gate.due(parse_stamp("2024-03-01 10:20:00")?),
            Some(FlushReason::Budget)
        );
        Ok(())
    }

    #[test]
    fn test_gate_day_boundary_beats_budget() -> Result<()> {
        let start = parse_stamp("2024-03-01 23:55:00")?;
        let gate = FlushGate::new(POLL, FLUSH, start);

        // 00:00:05 is within the budget window, but the previous tick fell
        // on the old day.
        assert_eq!(
            gate.due(parse_stamp("2024-03-02 00:00:05")?),
            Some(FlushReason::DayBoundary)
        );
        // One tick later the boundary has passed.
        assert_eq!(gate.due(parse_stamp("2024-03-02 00:00:15")?), None);
        Ok(())
    }
}
