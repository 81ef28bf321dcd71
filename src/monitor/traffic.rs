use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::{
    accum::{Flushed, Rollover, ScalarCounter},
    samplers::TrafficSampler,
    store::TextLogStore,
    utils::time::{format_stamp, parse_stamp},
};

use super::ticker::{FlushReason, Monitor};

const GIB: u64 = 1 << 30;

const COLUMNS: [&str; 11] = [
    "Date", "Rx_Bytes", "Tx_Bytes", "Rx_Month", "Tx_Month", "Rx_Day", "Tx_Day", "Rx_Mon_GiB",
    "Tx_Mon_GiB", "Rx_Day_GiB", "Tx_Day_GiB",
];
const WIDTHS: [usize; 11] = [19, 12, 12, 12, 12, 11, 11, 10, 10, 10, 10];

/// One day of traffic history. The six integer fields are authoritative; the
/// four GiB columns are display values derived from them on every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficRecord {
    pub stamp: DateTime<Local>,
    pub rx_raw: u64,
    pub tx_raw: u64,
    pub rx_month: u64,
    pub tx_month: u64,
    pub rx_day: u64,
    pub tx_day: u64,
}

impl TrafficRecord {
    pub fn header() -> String {
        format_columns(COLUMNS.map(String::from))
    }

    pub fn to_line(&self) -> String {
        let gib = |v: u64| format!("{:.2}", v as f64 / GIB as f64);
        format_columns([
            format_stamp(self.stamp),
            self.rx_raw.to_string(),
            self.tx_raw.to_string(),
            self.rx_month.to_string(),
            self.tx_month.to_string(),
            self.rx_day.to_string(),
            self.tx_day.to_string(),
            gib(self.rx_month),
            gib(self.tx_month),
            gib(self.rx_day),
            gib(self.tx_day),
        ])
    }

    pub fn parse(line: &str) -> Result<Self> {
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < 7 {
            return Err(anyhow!("expected at least 7 columns, got {}", fields.len()));
        }
        let int = |index: usize| -> Result<u64> {
            fields[index]
                .trim()
                .parse::<u64>()
                .with_context(|| format!("column {:?}", COLUMNS[index]))
        };
        Ok(Self {
            stamp: parse_stamp(fields[0])?,
            rx_raw: int(1)?,
            tx_raw: int(2)?,
            rx_month: int(3)?,
            tx_month: int(4)?,
            rx_day: int(5)?,
            tx_day: int(6)?,
        })
    }
}

fn format_columns(fields: [String; 11]) -> String {
    fields
        .iter()
        .zip(WIDTHS)
        .map(|(field, width)| format!("{field:>width$}"))
        .collect::<Vec<_>>()
        .join("\t")
}

/// Rolling daily/monthly byte-delta accumulator for one interface.
pub struct TrafficAccumulator {
    stamp: DateTime<Local>,
    rx: ScalarCounter,
    tx: ScalarCounter,
    rx_month: u64,
    tx_month: u64,
    rx_day: u64,
    tx_day: u64,
}

impl TrafficAccumulator {
    /// Fresh history: the first record carries the raw counters and zero
    /// deltas.
    pub fn seed(now: DateTime<Local>, rx_raw: u64, tx_raw: u64) -> (Self, TrafficRecord) {
        let accumulator = Self {
            stamp: now,
            rx: ScalarCounter::new(rx_raw),
            tx: ScalarCounter::new(tx_raw),
            rx_month: 0,
            tx_month: 0,
            rx_day: 0,
            tx_day: 0,
        };
        let record = accumulator.record(now);
        (accumulator, record)
    }

    /// Resumes from the last persisted record; its raw counters become the
    /// delta baseline.
    pub fn resume(record: &TrafficRecord) -> Self {
        Self {
            stamp: record.stamp,
            rx: ScalarCounter::new(record.rx_raw),
            tx: ScalarCounter::new(record.tx_raw),
            rx_month: record.rx_month,
            tx_month: record.tx_month,
            rx_day: record.rx_day,
            tx_day: record.tx_day,
        }
    }

    pub fn ingest(&mut self, rx_raw: u64, tx_raw: u64, now: DateTime<Local>) -> Flushed<TrafficRecord> {
        let delta_rx = self.rx.advance(rx_raw);
        let delta_tx = self.tx.advance(tx_raw);
        self.rx_month += delta_rx;
        self.tx_month += delta_tx;
        self.rx_day += delta_rx;
        self.tx_day += delta_tx;

        match Rollover::between(self.stamp, now) {
            Rollover::Same => {
                self.stamp = now;
                Flushed::Updated(self.record(now))
            }
            rollover => {
                // The delta accrued since the previous flush is credited to
                // the old day; its record keeps the stamp of the last flush
                // before the boundary.
                let finalized = self.record(self.stamp);
                if rollover == Rollover::Month {
                    self.rx_month = 0;
                    self.tx_month = 0;
                }
                self.rx_day = 0;
                self.tx_day = 0;
                self.stamp = now;
                Flushed::RolledOver {
                    finalized,
                    opened: self.record(now),
                }
            }
        }
    }

    fn record(&self, stamp: DateTime<Local>) -> TrafficRecord {
        TrafficRecord {
            stamp,
            rx_raw: self.rx.baseline(),
            tx_raw: self.tx.baseline(),
            rx_month: self.rx_month,
            tx_month: self.tx_month,
            rx_day: self.rx_day,
            tx_day: self.tx_day,
        }
    }
}

/// Polls interface byte counters and maintains the traffic log.
pub struct TrafficMonitor {
    sampler: Box<dyn TrafficSampler>,
    store: TextLogStore,
    accumulator: TrafficAccumulator,
}

impl TrafficMonitor {
    pub async fn open(
        log_file: &Path,
        mut sampler: Box<dyn TrafficSampler>,
        now: DateTime<Local>,
    ) -> Result<Self> {
        let mut store = TextLogStore::open(log_file, &TrafficRecord::header()).await?;

        let tail = store.tail(1).first().cloned();
        let resumed = match tail {
            Some(line) => match TrafficRecord::parse(&line) {
                Ok(record) => Some(TrafficAccumulator::resume(&record)),
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
                let (rx_raw, tx_raw) = sampler
                    .counters()
                    .context("reading initial interface counters")?;
                let (accumulator, record) = TrafficAccumulator::seed(now, rx_raw, tx_raw);
                store.push(record.to_line());
                store.commit().await?;
                info!("Seeded fresh traffic history at {:?}", store.path());
                accumulator
            }
        };

        Ok(Self {
            sampler,
            store,
            accumulator,
        })
    }
}

#[async_trait]
impl Monitor for TrafficMonitor {
    async fn tick(&mut self, _now: DateTime<Local>) -> Result<()> {
        // Counters are only read when the flush gate opens.
        Ok(())
    }

    async fn flush(&mut self, now: DateTime<Local>, _reason: FlushReason) -> Result<()> {
        let (rx_raw, tx_raw) = match self.sampler.counters() {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping flush, counter read failed {e:?}");
                return Ok(());
            }
        };
        // Interface down or parse failure on the OS side. Skip the tick
        // rather than corrupt the totals.
        if rx_raw == 0 || tx_raw == 0 {
            debug!("Skipping flush, interface reported empty counters");
            return Ok(());
        }

        match self.accumulator.ingest(rx_raw, tx_raw, now) {
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
