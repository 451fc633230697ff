mod diagnostics;
mod layout;
mod sim;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use amiga_input::{
    Chipset, Device, EventSink, JsonLinesSink, LogSink, MousePort, Poller, PollerConfig,
    RegisterMap, SessionStats,
};
use amiga_keymap::AMIGA_KEYMAP;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "amiga-input-cli")]
#[command(about = "Amiga keyboard, mouse and lightpen input bridge")]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the input devices and forward events until interrupted
    Run {
        #[command(flatten)]
        devices: DeviceArgs,

        /// Where events go
        #[arg(long, value_enum, default_value_t = EventOutput::Log)]
        events: EventOutput,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Initialize every device, read it once and report what was seen
    Test {
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Print the keyboard matrix mapping
    Keymap {
        /// Write an SVG rendering to this file instead
        #[arg(long)]
        svg: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DeviceArgs {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Poll interval in microseconds
    #[arg(long)]
    interval_us: Option<u64>,

    /// Chipset of the attached machine (ocs, ecs, aga)
    #[arg(long)]
    chipset: Option<Chipset>,

    /// Game port with a mouse attached (repeatable)
    #[arg(long = "mouse-port", value_parser = clap::value_parser!(u8).range(0..=1))]
    mouse_ports: Vec<u8>,

    /// Largest reported mouse delta per axis per tick
    #[arg(long)]
    max_delta: Option<i32>,

    /// Do not poll the lightpen
    #[arg(long)]
    no_lightpen: bool,
}

impl DeviceArgs {
    fn resolve(&self) -> Result<PollerConfig> {
        let mut config = match &self.config {
            Some(path) => PollerConfig::load(path)?,
            None => PollerConfig::default(),
        };

        if let Some(interval_us) = self.interval_us {
            config.poll_interval_us = interval_us;
        }
        if let Some(chipset) = self.chipset {
            config.chipset = chipset;
        }
        if !self.mouse_ports.is_empty() {
            config.mouse_ports = self
                .mouse_ports
                .iter()
                .map(|&port| MousePort::try_from(port).map_err(anyhow::Error::msg))
                .collect::<Result<_>>()?;
        }
        if let Some(max_delta) = self.max_delta {
            config.max_mouse_delta = max_delta;
        }
        if self.no_lightpen {
            config.lightpen = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum EventOutput {
    /// Human-readable log lines
    Log,
    /// One JSON input_event per line on stdout
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("amiga_input={log_level},amiga_input_cli={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    match cli.command {
        Command::Run {
            devices,
            events,
            duration_secs,
        } => {
            let config = devices.resolve().context("resolving configuration")?;
            let stats = run(&config, events, duration_secs.map(Duration::from_secs))?;
            print_stats(&stats);
        }
        Command::Test { devices } => {
            let config = devices.resolve().context("resolving configuration")?;
            let mut bus = sim::idle_machine(&RegisterMap::for_chipset(config.chipset));
            let failed = diagnostics::run(&mut bus, &config, &mut io::stdout().lock())?;
            if failed > 0 {
                bail!("{failed} device(s) failed");
            }
        }
        Command::Keymap { svg } => match svg {
            Some(path) => {
                fs::write(&path, layout::render_svg(&AMIGA_KEYMAP))
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Keymap written to {}", path.display());
            }
            None => print!("{}", layout::render_table(&AMIGA_KEYMAP)),
        },
    }

    Ok(())
}

fn run(
    config: &PollerConfig,
    events: EventOutput,
    duration: Option<Duration>,
) -> Result<SessionStats> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop_clone = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop_clone.store(true, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let bus = sim::idle_machine(&RegisterMap::for_chipset(config.chipset));
    let sink: Box<dyn EventSink + Send> = match events {
        EventOutput::Log => Box::new(LogSink),
        EventOutput::Json => Box::new(JsonLinesSink::new(io::stdout())),
    };

    let mut poller = Poller::new(bus, sink, config);
    poller.start().context("starting input poller")?;
    info!(chipset = %config.chipset, "polling, press Ctrl-C to stop");

    let started = Instant::now();
    while !stop.load(Ordering::Relaxed) && duration.map_or(true, |d| started.elapsed() < d) {
        std::thread::sleep(Duration::from_millis(50));
    }

    let stats = poller.stop().context("stopping input poller")?;
    Ok(stats.unwrap_or_default())
}

fn print_stats(stats: &SessionStats) {
    eprintln!("ticks:     {}", stats.ticks);
    eprintln!("delivered: {}", stats.delivered);
    eprintln!("dropped:   {}", stats.dropped);
    for device in Device::ALL {
        let failures = stats.failures(device);
        if failures > 0 {
            eprintln!("{device} scan failures: {failures}");
        }
    }
}
