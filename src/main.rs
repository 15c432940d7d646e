use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{Level, info, warn};

use evpost::caps::{DeviceConfig, LidReliability, ModelQuirks, ScrollMethod};
use evpost::event_dispatcher::LogSink;
use evpost::input_devices::{EvdevSource, ReaderMessage, spawn_reader, write_events};
use evpost::seat::Seat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Quirk {
    LenovoScrollpoint,
    ProximityOut,
    TabletModeNoSuspend,
}

impl From<Quirk> for ModelQuirks {
    fn from(quirk: Quirk) -> Self {
        match quirk {
            Quirk::LenovoScrollpoint => ModelQuirks::LENOVO_SCROLLPOINT,
            Quirk::ProximityOut => ModelQuirks::PROXIMITY_OUT,
            Quirk::TabletModeNoSuspend => ModelQuirks::TABLET_MODE_NO_SUSPEND,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "evpost", version, about = "Post-process evdev events and log the result")]
struct Args {
    /// Swap left and right buttons
    #[arg(long)]
    left_handed: bool,

    /// Clockwise rotation of relative motion, in degrees
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..360))]
    rotation: u32,

    /// Turn motion into scrolling while this button code is held
    #[arg(long)]
    scroll_button: Option<u16>,

    /// Write "lid open" back to the lid switch on keyboard activity
    #[arg(long)]
    lid_write_open: bool,

    /// Extra model quirks applied to every device
    #[arg(long = "quirk", value_enum)]
    quirks: Vec<Quirk>,

    /// Print the probed capabilities as TOML and exit
    #[arg(long)]
    print_caps: bool,

    /// More logging, repeat for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Device nodes, e.g. /dev/input/event3
    #[arg(required = true)]
    devices: Vec<PathBuf>,
}

fn elapsed_us(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let sources = args
        .devices
        .iter()
        .map(EvdevSource::open)
        .collect::<Result<Vec<_>>>()?;

    if args.print_caps {
        for source in &sources {
            let caps = toml::to_string_pretty(&source.probe())
                .with_context(|| format!("failed to serialize caps of {}", source.path().display()))?;
            println!("# {}\n{caps}", source.path().display());
        }
        return Ok(());
    }

    let config = DeviceConfig {
        left_handed: args.left_handed,
        rotation: args.rotation,
        scroll_method: args
            .scroll_button
            .map_or(ScrollMethod::NoScroll, ScrollMethod::OnButtonDown),
        lid_reliability: if args.lid_write_open {
            LidReliability::WriteOpen
        } else {
            LidReliability::Reliable
        },
        calibration: None,
    };
    let quirks = args
        .quirks
        .iter()
        .fold(ModelQuirks::empty(), |acc, &quirk| acc | quirk.into());

    let epoch = Instant::now();
    let timer_epoch = tokio::time::Instant::from_std(epoch);
    let mut seat = Seat::new();
    let mut sink = LogSink;
    let mut paths = HashMap::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for source in sources {
        let mut caps = source.probe();
        caps.quirks |= quirks;
        info!(path = %source.path().display(), "{caps:?}");

        let id = seat.add_device(caps, config.clone(), elapsed_us(epoch), &mut sink);
        paths.insert(id, source.path().to_path_buf());
        spawn_reader(id, source, epoch, tx.clone());
    }
    drop(tx);

    loop {
        let deadline = seat.next_deadline();
        let timer = async move {
            match deadline {
                Some(deadline) => {
                    tokio::time::sleep_until(timer_epoch + Duration::from_micros(deadline)).await
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            message = rx.recv() => match message {
                Some(ReaderMessage::Event(id, event)) => seat.process(id, &event, &mut sink),
                Some(ReaderMessage::Closed(id)) => {
                    seat.remove_device(id, elapsed_us(epoch), &mut sink);
                    paths.remove(&id);
                }
                None => {
                    info!("no devices left");
                    break;
                }
            },
            () = timer => seat.dispatch_timers(elapsed_us(epoch), &mut sink),
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("interrupted");
                break;
            }
        }

        for (id, events) in seat.take_writebacks() {
            let Some(path) = paths.get(&id) else {
                continue;
            };
            if let Err(err) = write_events(path, &events) {
                warn!("{err:#}");
            }
        }
    }

    let now = elapsed_us(epoch);
    let ids: Vec<_> = seat.device_ids().collect();
    for id in ids {
        seat.remove_device(id, now, &mut sink);
    }
    Ok(())
}
