use std::{fmt::Display, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use ansi_term::Style;
use chrono::{DateTime, Local};
use chrono_english::parse_date_string;
use clap::{Parser, ValueEnum};

use crate::utils::time::parse_stamp;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MonitorKind {
    Traffic,
    Keyboard,
    Screen,
}

impl MonitorKind {
    fn default_file_name(&self) -> &'static str {
        match self {
            MonitorKind::Traffic => "daily_traffic.log",
            MonitorKind::Keyboard => "keyboard.log",
            MonitorKind::Screen => "screentime.log",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ShowCommand {
    #[arg(value_enum, help = "Which monitor's log to print")]
    monitor: MonitorKind,
    #[arg(long, help = "Log file path, if the monitor runs with a custom --file")]
    file: Option<PathBuf>,
    #[arg(
        long,
        short,
        help = "Only records from this moment on. Examples are \"yesterday\", \"1 week ago\", \"15/03/2025\""
    )]
    since: Option<String>,
    #[arg(long, short = 'n', help = "At most this many day records")]
    last: Option<usize>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

pub async fn process_show_command(command: ShowCommand, state_dir: &Path) -> Result<()> {
    let path = command
        .file
        .unwrap_or_else(|| state_dir.join(command.monitor.default_file_name()));
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {path:?}"))?;

    let since = command
        .since
        .map(|v| {
            parse_date_string(&v, Local::now(), command.date_style.into())
                .map_err(|e| anyhow!("Can't parse --since value: {e}"))
        })
        .transpose()?;

    let mut lines = contents.lines();
    let Some(header) = lines.next() else {
        println!("{path:?} is empty");
        return Ok(());
    };

    let (mut dated, sentinels) = partition_records(lines);
    if let Some(since) = since {
        dated.retain(|(stamp, _)| *stamp >= since);
    }
    if let Some(last) = command.last {
        if dated.len() > last {
            dated.drain(..dated.len() - last);
        }
    }

    println!("{}", Style::new().bold().paint(header));
    for (_, line) in &dated {
        println!("{line}");
    }
    // Sentinel lines (the keyboard all-time total) always print last.
    for line in &sentinels {
        println!("{line}");
    }
    Ok(())
}

fn partition_records<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> (Vec<(DateTime<Local>, &'a str)>, Vec<&'a str>) {
    let mut dated = vec![];
    let mut sentinels = vec![];
    for line in lines {
        match parse_stamp(line.get(..19).unwrap_or_default()) {
            Ok(stamp) => dated.push((stamp, line)),
            Err(_) => sentinels.push(line),
        }
    }
    (dated, sentinels)
}
