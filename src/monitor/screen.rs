use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::{
    accum::{Flushed, Rollover},
    samplers::DisplaySampler,
    store::TextLogStore,
    utils::time::{format_stamp, hms_to_secs, parse_stamp, secs_to_hms},
};

use super::ticker::{FlushReason, Monitor};

/// One day of screen history: seconds the display was on and seconds the
/// machine was powered on, both stored as HH:MM:SS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenRecord {
    pub stamp: DateTime<Local>,
    pub screen_secs: u64,
    pub power_secs: u64,
}

impl ScreenRecord {
    pub fn header() -> String {
        format!("{:<19}\tScreen time\tPower-on time", "Date")
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            format_stamp(self.stamp),
            secs_to_hms(self.screen_secs),
            secs_to_hms(self.power_secs),
        )
    }

    pub fn parse(line: &str) -> Result<Self> {
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() != 3 {
            return Err(anyhow!("expected 3 columns, got {}", fields.len()));
        }
        Ok(Self {
            stamp: parse_stamp(fields[0])?,
            screen_secs: hms_to_secs(fields[1]).context("screen time column")?,
            power_secs: hms_to_secs(fields[2]).context("power-on time column")?,
        })
    }
}

/// Accumulates observed screen-on/power-on seconds between flushes and folds
/// them into the daily record on ingest.
pub struct ScreenAccumulator {
    stamp: DateTime<Local>,
    screen_secs: u64,
    power_secs: u64,
    pending_screen: u64,
    pending_power: u64,
}

impl ScreenAccumulator {
    pub fn seed(now: DateTime<Local>) -> (Self, ScreenRecord) {
        let accumulator = Self {
            stamp: now,
            screen_secs: 0,
            power_secs: 0,
            pending_screen: 0,
            pending_power: 0,
        };
        let record = accumulator.record(now);
        (accumulator, record)
    }

    pub fn resume(record: &ScreenRecord) -> Self {
        Self {
            stamp: record.stamp,
            screen_secs: record.screen_secs,
            power_secs: record.power_secs,
            pending_screen: 0,
            pending_power: 0,
        }
    }

    /// Registers one observed poll interval.
    pub fn observe(&mut self, elapsed_secs: u64, screen_on: bool) {
        self.pending_power += elapsed_secs;
        if screen_on {
            self.pending_screen += elapsed_secs;
        }
    }

    pub fn pending_screen(&self) -> u64 {
        self.pending_screen
    }

    pub fn ingest(&mut self, now: DateTime<Local>) -> Flushed<ScreenRecord> {
        self.screen_secs += self.pending_screen;
        self.power_secs += self.pending_power;
        self.pending_screen = 0;
        self.pending_power = 0;

        match Rollover::between(self.stamp, now) {
            Rollover::Same => {
                self.stamp = now;
                Flushed::Updated(self.record(now))
            }
            _ => {
                // Everything observed since the previous flush is credited
                // to the old day; the new day starts at zero.
                let finalized = self.record(self.stamp);
                self.screen_secs = 0;
                self.power_secs = 0;
                self.stamp = now;
                Flushed::RolledOver {
                    finalized,
                    opened: self.record(now),
                }
            }
        }
    }

    fn record(&self, stamp: DateTime<Local>) -> ScreenRecord {
        ScreenRecord {
            stamp,
            screen_secs: self.screen_secs,
            power_secs: self.power_secs,
        }
    }
}

/// Polls display power state and maintains the screen-time log.
pub struct ScreenMonitor {
    sampler: Box<dyn DisplaySampler>,
    store: TextLogStore,
    accumulator: ScreenAccumulator,
    poll_secs: u64,
}

impl ScreenMonitor {
    pub async fn open(
        log_file: &Path,
        sampler: Box<dyn DisplaySampler>,
        poll_secs: u64,
        now: DateTime<Local>,
    ) -> Result<Self> {
        let mut store = TextLogStore::open(log_file, &ScreenRecord::header()).await?;

        let tail = store.tail(1).first().cloned();
        let resumed = match tail {
            Some(line) => match ScreenRecord::parse(&line) {
                Ok(record) => Some(ScreenAccumulator::resume(&record)),
                Err(e) => {
                    warn!(
                        "Last record of {:?} is malformed, discarding history: {e:?}",
                        store.path()
                    );
                    store.reset();
                    None
                }
            },
            None => None,
        };

        let accumulator = match resumed {
            Some(accumulator) => accumulator,
            None => {
                let (accumulator, record) = ScreenAccumulator::seed(now);
                store.push(record.to_line());
                store.commit().await?;
                info!("Seeded fresh screen history at {:?}", store.path());
                accumulator
            }
        };

        Ok(Self {
            sampler,
            store,
            accumulator,
            poll_secs,
        })
    }
}

#[async_trait]
impl Monitor for ScreenMonitor {
    async fn tick(&mut self, _now: DateTime<Local>) -> Result<()> {
        let state = self.sampler.power_state()?;
        self.accumulator
            .observe(self.poll_secs, state.is_screen_on());
        Ok(())
    }

    fn has_pending(&self) -> bool {
        // No point rewriting the record while the screen stays off; day
        // boundaries flush regardless.
        self.accumulator.pending_screen() > 0
    }

    async fn flush(&mut self, now: DateTime<Local>, _reason: FlushReason) -> Result<()> {
        match self.accumulator.ingest(now) {
            Flushed::Updated(record) => {
                self.store.set_tail(1, vec![record.to_line()]);
            }
            Flushed::RolledOver { finalized, opened } => {
                self.store
                    .set_tail(1, vec![finalized.to_line(), opened.to_line()]);
            }
        }

        self.store
            .commit()
            .await
            .with_context(|| format!("persisting {:?}", self.store.path()))
    }
}
