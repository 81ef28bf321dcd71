pub mod show;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use show::{process_show_command, ShowCommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    monitor::{
        start_keyboard, start_screen, start_traffic, MonitorConfig, DEFAULT_FLUSH_INTERVAL,
        DEFAULT_POLL_INTERVAL,
    },
    samplers::NetSampler,
    utils::{dir::default_state_dir, logging::enable_logging},
};

#[derive(Parser, Debug)]
#[command(name = "Daylog", version, long_about = None)]
#[command(about = "Personal monitoring utilities for daily usage statistics", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Mirror logging to the console")]
    log: bool,
    #[arg(long = "log-filter", help = "Logging level. This option is for debugging purposes only")]
    log_filter: Option<LevelFilter>,
}

#[derive(clap::Args, Debug)]
struct PollingArgs {
    #[arg(
        long,
        help = "Log file path. By default the file lives in $XDG_STATE_HOME/daylog or the platform equivalent"
    )]
    file: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs(), help = "Seconds between polls")]
    interval: u64,
    #[arg(
        long = "flush-interval",
        default_value_t = DEFAULT_FLUSH_INTERVAL.as_secs(),
        help = "Seconds between flushes of accumulated data to the log file. Day boundaries always flush"
    )]
    flush_interval: u64,
}

impl PollingArgs {
    fn into_config(self, state_dir: &std::path::Path, default_name: &str) -> MonitorConfig {
        MonitorConfig {
            log_file: self.file.unwrap_or_else(|| state_dir.join(default_name)),
            poll_interval: Duration::from_secs(self.interval),
            flush_interval: Duration::from_secs(self.flush_interval),
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Log daily and monthly network traffic of one interface")]
    Traffic {
        #[arg(
            long,
            short,
            help = "Interface to monitor. Defaults to the busiest non-loopback interface"
        )]
        interface: Option<String>,
        #[command(flatten)]
        polling: PollingArgs,
    },
    #[command(about = "Log daily keypress frequencies")]
    Keyboard {
        #[command(flatten)]
        polling: PollingArgs,
    },
    #[command(about = "Log daily screen time and power-on time")]
    Screen {
        #[command(flatten)]
        polling: PollingArgs,
    },
    #[command(about = "Print recent records of a monitor's log")]
    Show {
        #[command(flatten)]
        command: ShowCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let state_dir = default_state_dir()?;

    match args.commands {
        Commands::Traffic { interface, polling } => {
            enable_logging("traffic", &state_dir, args.log_filter, args.log)?;
            let interface = match interface {
                Some(v) => v,
                None => NetSampler::busiest_interface()
                    .context("no active network interface found, pass --interface")?,
            };
            info!("Monitoring traffic of interface {interface}");
            start_traffic(polling.into_config(&state_dir, "daily_traffic.log"), interface).await
        }
        Commands::Keyboard { polling } => {
            enable_logging("keyboard", &state_dir, args.log_filter, args.log)?;
            start_keyboard(polling.into_config(&state_dir, "keyboard.log")).await
        }
        Commands::Screen { polling } => {
            enable_logging("screen", &state_dir, args.log_filter, args.log)?;
            start_screen(polling.into_config(&state_dir, "screentime.log")).await
        }
        Commands::Show { command } => process_show_command(command, &state_dir).await,
    }
}
