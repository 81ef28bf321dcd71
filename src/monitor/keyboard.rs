use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::{
    accum::{frequency::FrequencyMap, Rollover},
    store::TextLogStore,
    utils::time::{format_stamp, parse_stamp},
};

use super::ticker::{FlushReason, Monitor};

const TOTAL_LABEL: &str = "Total";

/// One day of keypress history: a frequency map serialized as JSON, ordered
/// by descending count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardRecord {
    pub stamp: DateTime<Local>,
    pub counts: FrequencyMap,
}

impl KeyboardRecord {
    pub fn header() -> String {
        format!("{:<19}\tKey Frequency", "Date")
    }

    pub fn to_line(&self) -> String {
        format!("{}\t{}", format_stamp(self.stamp), self.counts.to_json())
    }

    pub fn parse(line: &str) -> Result<Self> {
        let (stamp, json) = line
            .split_once('\t')
            .ok_or_else(|| anyhow!("expected two columns"))?;
        Ok(Self {
            stamp: parse_stamp(stamp)?,
            counts: FrequencyMap::from_json(json).context("key frequency column")?,
        })
    }
}

/// The trailing sentinel line holding the all-time frequency map.
fn total_line(all_time: &FrequencyMap) -> String {
    format!("{TOTAL_LABEL:<19}\t{}", all_time.to_json())
}

fn parse_total_line(line: &str) -> Result<FrequencyMap> {
    let (label, json) = line
        .split_once('\t')
        .ok_or_else(|| anyhow!("expected two columns"))?;
    if label.trim() != TOTAL_LABEL {
        return Err(anyhow!("expected the Total sentinel, got {label:?}"));
    }
    FrequencyMap::from_json(json).context("all-time frequency column")
}

/// Result of ingesting the live frequency map. Unlike the scalar monitors
/// the keyboard log always ends with the Total sentinel, so the rollover
/// shape carries it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardFlush {
    Updated {
        day: KeyboardRecord,
        all_time: FrequencyMap,
    },
    RolledOver {
        finalized: KeyboardRecord,
        opened: KeyboardRecord,
        all_time: FrequencyMap,
    },
}

/// Daily/all-time frequency accumulator with restart detection.
pub struct KeyboardAccumulator {
    stamp: DateTime<Local>,
    /// Presses observed in memory since the day started (or the process
    /// started, until the first flush reconciles).
    live: FrequencyMap,
    /// The day map as last persisted, the baseline for delta computation.
    persisted_day: FrequencyMap,
    all_time: FrequencyMap,
}

impl KeyboardAccumulator {
    pub fn seed(now: DateTime<Local>) -> Self {
        Self {
            stamp: now,
            live: FrequencyMap::new(),
            persisted_day: FrequencyMap::new(),
            all_time: FrequencyMap::new(),
        }
    }

    pub fn resume(day: KeyboardRecord, all_time: FrequencyMap) -> Self {
        Self {
            stamp: day.stamp,
            live: FrequencyMap::new(),
            persisted_day: day.counts,
            all_time,
        }
    }

    pub fn note_press(&mut self, label: &str) {
        self.live.note(label);
    }

    pub fn ingest(&mut self, now: DateTime<Local>) -> KeyboardFlush {
        // A live map that dominates the persisted one continues it; anything
        // else means the process restarted since the last flush, so the live
        // map is a whole delta and the persisted counts are folded back in.
        // Restart and data corruption are indistinguishable here.
        let delta = if self.live.dominates(&self.persisted_day) {
            self.live.saturating_sub(&self.persisted_day)
        } else {
            let delta = self.live.clone();
            self.live.merge(&self.persisted_day);
            delta
        };
        self.all_time.merge(&delta);
        self.persisted_day = self.live.clone();

        if !Rollover::between(self.stamp, now).crossed_day() {
            self.stamp = now;
            KeyboardFlush::Updated {
                day: KeyboardRecord {
                    stamp: now,
                    counts: self.live.clone(),
                },
                all_time: self.all_time.clone(),
            }
        } else {
            let finalized = KeyboardRecord {
                stamp: self.stamp,
                counts: self.live.clone(),
            };
            self.live.clear();
            self.persisted_day.clear();
            self.stamp = now;
            KeyboardFlush::RolledOver {
                finalized,
                opened: KeyboardRecord {
                    stamp: now,
                    counts: FrequencyMap::new(),
                },
                all_time: self.all_time.clone(),
            }
        }
    }
}

/// Drains captured key events once per tick and maintains the keyboard log.
pub struct KeyboardMonitor {
    events: UnboundedReceiver<String>,
    store: TextLogStore,
    accumulator: KeyboardAccumulator,
}

impl KeyboardMonitor {
    pub async fn open(
        log_file: &Path,
        events: UnboundedReceiver<String>,
        now: DateTime<Local>,
    ) -> Result<Self> {
        let mut store = TextLogStore::open(log_file, &KeyboardRecord::header()).await?;

        let tail = store.tail(2).to_vec();
        let resumed = match tail.as_slice() {
            [day_line, sentinel_line] => {
                match KeyboardRecord::parse(day_line)
                    .and_then(|day| Ok((day, parse_total_line(sentinel_line)?)))
                {
                    Ok((day, all_time)) => Some(KeyboardAccumulator::resume(day, all_time)),
                    Err(e) => {
                        warn!(
                            "Tail of {:?} is malformed, discarding history: {e:?}",
                            store.path()
                        );
                        store.reset();
                        None
                    }
                }
            }
            _ => None,
        };

        let accumulator = match resumed {
            Some(accumulator) => accumulator,
            None => {
                let accumulator = KeyboardAccumulator::seed(now);
                store.reset();
                store.push(
                    KeyboardRecord {
                        stamp: now,
                        counts: FrequencyMap::new(),
                    }
                    .to_line(),
                );
                store.push(total_line(&FrequencyMap::new()));
                store.commit().await?;
                info!("Seeded fresh keyboard history at {:?}", store.path());
                accumulator
            }
        };

        Ok(Self {
            events,
            store,
            accumulator,
        })
    }
}

#[async_trait]
impl Monitor for KeyboardMonitor {
    async fn tick(&mut self, _now: DateTime<Local>) -> Result<()> {
        // Drain everything the capture thread queued since the last tick.
        while let Ok(label) = self.events.try_recv() {
            self.accumulator.note_press(&label);
        }
        Ok(())
    }

    async fn flush(&mut self, now: DateTime<Local>, _reason: FlushReason) -> Result<()> {
        match self.accumulator.ingest(now) {
            KeyboardFlush::Updated { day, all_time } => {
                self.store
                    .set_tail(2, vec![day.to_line(), total_line(&all_time)]);
            }
            KeyboardFlush::RolledOver {
                finalized,
                opened,
                all_time,
            } => {
                self.store
                    .set_tail(2, vec![finalized.to_line(), opened.to_line()]);
                self.store.push(total_line(&all_time));
            }
        }

        self.store
            .commit()
            .await
            .with_context(|| format!("persisting {:?}", self.store.path()))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use crate::{
        monitor::ticker::{FlushReason, Monitor},
        utils::time::parse_stamp,
    };

    use super::*;

    async fn open_with_presses(
        path: &std::path::Path,
        now: &str,
        presses: &[&str],
    ) -> Result<KeyboardMonitor> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let monitor = KeyboardMonitor::open(path, receiver, parse_stamp(now)?).await?;
        for press in presses {
            sender.send((*press).to_owned())?;
        }
        Ok(monitor)
    }

    #[tokio::test]
    async fn test_seeds_empty_day_and_total() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyboard.log");

        open_with_presses(&path, "2024-05-14 10:00:00", &[]).await?;

        let contents = tokio::fs::read_to_string(&path).await?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            [
                KeyboardRecord::header().as_str(),
                "2024-05-14 10:00:00\t{}",
                "Total              \t{}",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_same_day_flush_updates_in_place() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyboard.log");

        let mut monitor =
            open_with_presses(&path, "2024-05-14 10:00:00", &["cmd", "cmd", "tab"]).await?;
        let now = parse_stamp("2024-05-14 10:10:00")?;
        monitor.tick(now).await?;
        monitor.flush(now, FlushReason::Budget).await?;

        let contents = tokio::fs::read_to_string(&path).await?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            r#"2024-05-14 10:10:00	{"total":3,"cmd":2,"tab":1}"#
        );
        assert_eq!(lines[2], "Total              \t{\"total\":3,\"cmd\":2,\"tab\":1}");
        Ok(())
    }

    /// Restart reconciliation: a live map that does not dominate the
    /// persisted day map is treated as a whole delta on top of it.
    #[tokio::test]
    async fn test_restart_reconciles_against_persisted_day() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyboard.log");
        tokio::fs::write(
            &path,
            format!(
                "{}\n2024-05-14 10:00:00\t{{\"total\":5,\"a\":5}}\n{:<19}\t{{\"total\":5,\"a\":5}}\n",
                KeyboardRecord::header(),
                TOTAL_LABEL,
            ),
        )
        .await?;

        let mut monitor = open_with_presses(&path, "2024-05-14 11:00:00", &["a", "a"]).await?;
        let now = parse_stamp("2024-05-14 11:00:10")?;
        monitor.tick(now).await?;
        monitor.flush(now, FlushReason::Budget).await?;

        let contents = tokio::fs::read_to_string(&path).await?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        // Day map reconciled to persisted + live, all-time grew by the live
        // delta only.
        assert_eq!(lines[1], "2024-05-14 11:00:10\t{\"a\":7,\"total\":7}");
        assert_eq!(lines[2], "Total              \t{\"total\":7,\"a\":7}");
        Ok(())
    }

    #[tokio::test]
    async fn test_day_rollover_appends_fresh_day_and_total() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyboard.log");

        let mut monitor =
            open_with_presses(&path, "2024-05-14 23:59:00", &["w", "enter"]).await?;
        let boundary = parse_stamp("2024-05-15 00:00:05")?;
        monitor.tick(boundary).await?;
        monitor.flush(boundary, FlushReason::DayBoundary).await?;

        let contents = tokio::fs::read_to_string(&path).await?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        // Old day finalized under its last stamp, new day opens empty, the
        // sentinel moves to the end.
        assert_eq!(
            lines[1],
            r#"2024-05-14 23:59:00	{"total":2,"w":1,"enter":1}"#
        );
        assert_eq!(lines[2], "2024-05-15 00:00:05\t{}");
        assert_eq!(
            lines[3],
            "Total              \t{\"total\":2,\"w\":1,\"enter\":1}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_presses_after_rollover_start_the_new_day() -> Result<()> {
        let start = parse_stamp("2024-05-14 23:59:00")?;
        let mut accumulator = KeyboardAccumulator::seed(start);
        accumulator.note_press("w");
        accumulator.ingest(parse_stamp("2024-05-15 00:00:05")?);

        accumulator.note_press("q");
        let KeyboardFlush::Updated { day, all_time } =
            accumulator.ingest(parse_stamp("2024-05-15 00:10:05")?)
        else {
            panic!("same-day ingest must update in place");
        };

        assert_eq!(day.counts.get("q"), 1);
        assert_eq!(day.counts.get("w"), 0);
        assert_eq!(all_time.get("w"), 1);
        assert_eq!(all_time.get("q"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_tail_discards_history() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyboard.log");
        tokio::fs::write(
            &path,
            format!(
                "{}\n2024-05-14 10:00:00\tnot json\nTotal              \t{{}}\n",
                KeyboardRecord::header()
            ),
        )
        .await?;

        open_with_presses(&path, "2024-05-15 09:00:00", &[]).await?;

        let contents = tokio::fs::read_to_string(&path).await?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "2024-05-15 09:00:00\t{}");
        Ok(())
    }
}
