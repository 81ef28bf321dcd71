//! The three polling monitors and the loop driving them. Each monitor owns
//! one log store and one accumulator; [ticker::MonitorLoop] supplies the
//! shared tick/flush cadence and shutdown handling.

pub mod keyboard;
pub mod screen;
pub mod shutdown;
pub mod ticker;
pub mod traffic;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use keyboard::KeyboardMonitor;
use screen::ScreenMonitor;
use ticker::MonitorLoop;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use traffic::TrafficMonitor;

use crate::{
    samplers::{self, GenericDisplaySampler, NetSampler, TrafficSampler},
    utils::clock::{Clock, DefaultClock},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(600);

/// Shared knobs of every monitor: where the log lives and how often it is
/// polled and flushed.
pub struct MonitorConfig {
    pub log_file: PathBuf,
    pub poll_interval: Duration,
    pub flush_interval: Duration,
}

pub async fn start_traffic(config: MonitorConfig, interface: String) -> Result<()> {
    run_traffic(
        config,
        Box::new(NetSampler::new(interface)),
        Box::new(DefaultClock),
    )
    .await
}

async fn run_traffic(
    config: MonitorConfig,
    sampler: Box<dyn TrafficSampler>,
    clock: Box<dyn Clock>,
) -> Result<()> {
    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown::watch(shutdown_token.clone()));

    let monitor = TrafficMonitor::open(&config.log_file, sampler, clock.now()).await?;
    MonitorLoop::new(
        monitor,
        config.poll_interval,
        config.flush_interval,
        clock,
        shutdown_token,
    )
    .run()
    .await
}

pub async fn start_keyboard(config: MonitorConfig) -> Result<()> {
    let shutdown_token = CancellationToken::new();
    let (sender, receiver) = mpsc::unbounded_channel();
    samplers::spawn_key_listener(sender, shutdown_token.clone())?;
    tokio::spawn(shutdown::watch(shutdown_token.clone()));

    let clock: Box<dyn Clock> = Box::new(DefaultClock);
    let monitor = KeyboardMonitor::open(&config.log_file, receiver, clock.now()).await?;
    MonitorLoop::new(
        monitor,
        config.poll_interval,
        config.flush_interval,
        clock,
        shutdown_token,
    )
    .run()
    .await
}

pub async fn start_screen(config: MonitorConfig) -> Result<()> {
    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown::watch(shutdown_token.clone()));

    let clock: Box<dyn Clock> = Box::new(DefaultClock);
    let sampler = GenericDisplaySampler::new()?;
    let monitor = ScreenMonitor::open(
        &config.log_file,
        Box::new(sampler),
        config.poll_interval.as_secs(),
        clock.now(),
    )
    .await?;
    MonitorLoop::new(
        monitor,
        config.poll_interval,
        config.flush_interval,
        clock,
        shutdown_token,
    )
    .run()
    .await
}

#[cfg(test)]
mod monitor_tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Local};
    use tempfile::tempdir;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::{
        monitor::{ticker::MonitorLoop, traffic::TrafficMonitor, traffic::TrafficRecord},
        samplers::MockTrafficSampler,
        utils::{clock::Clock, logging::TEST_LOGGING, time::parse_stamp},
    };

    struct TestClock {
        start_time: DateTime<Local>,
        reference: Instant,
    }

    #[async_trait]
    impl Clock for TestClock {
        fn now(&self) -> DateTime<Local> {
            self.start_time
                + chrono::Duration::from_std(self.reference.elapsed())
                    .expect("elapsed time out of range")
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    /// Smoke test over the whole pipeline: loop, gate, accumulator and
    /// store, with the wall clock pinned to a fixed day.
    #[tokio::test]
    async fn smoke_test_traffic_loop() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join("daily_traffic.log");

        let counter = AtomicU64::new(1_000);
        let mut sampler = MockTrafficSampler::new();
        sampler.expect_counters().returning(move || {
            let rx = counter.fetch_add(500, Ordering::SeqCst);
            Ok((rx, rx / 2))
        });

        let clock = TestClock {
            start_time: parse_stamp("2024-03-01 10:00:00")?,
            reference: Instant::now(),
        };

        let shutdown_token = CancellationToken::new();
        let monitor = TrafficMonitor::open(&path, Box::new(sampler), clock.now()).await?;
        let monitor_loop = MonitorLoop::new(
            monitor,
            Duration::from_millis(50),
            Duration::from_millis(200),
            Box::new(clock),
            shutdown_token.clone(),
        );

        let (_, run_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(600)).await;
                shutdown_token.cancel()
            },
            monitor_loop.run(),
        );
        run_result?;

        let contents = tokio::fs::read_to_string(&path).await?;
        // All flushes landed on the same simulated day: header + 1 record.
        assert_eq!(contents.lines().count(), 2);
        let record = TrafficRecord::parse(contents.lines().nth(1).unwrap())?;
        assert!(record.rx_day >= 500);
        assert_eq!(record.rx_day, record.rx_month);
        assert!(record.rx_raw > 1_000);
        Ok(())
    }
}
