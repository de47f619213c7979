//! Fluval lamp controller binary.
//!
//! Connects to one or more lamps, keeps the sessions alive, and either
//! prints what the lamps report (`monitor`) or queues a single command and
//! lingers long enough for the heartbeat loop to deliver it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lamp_session::{BleTransport, DeviceRegistry, MockTransport, SessionConfig, SessionEvent, SessionHandle};
use lamp_wire::{to_hex, Command, Rgb};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{Backend, LampConfig};
use logging::LampLogFormatter;

/// Fluval BLE aquarium lamp controller
#[derive(Parser, Debug)]
#[command(name = "fluval-lamp", version, about = "Control Fluval BLE aquarium lamps")]
struct Args {
    /// Configuration file path
    #[arg(long, global = true, default_value = "fluval-lamp.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// BLE backend, overrides the config file
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Device address (repeatable), overrides the config file
    #[arg(long = "address", global = true)]
    addresses: Vec<String>,

    /// Upper bound on the wait between heartbeats, e.g. 10s
    #[arg(long, global = true)]
    heartbeat_interval: Option<humantime::Duration>,

    /// How long a queued command stays eligible for sending, e.g. 15s
    #[arg(long, global = true)]
    command_ttl: Option<humantime::Duration>,

    /// Pause before reconnecting after a failure, e.g. 1s
    #[arg(long, global = true)]
    cooldown: Option<humantime::Duration>,

    #[command(subcommand)]
    command: LampCommand,
}

#[derive(Subcommand, Debug)]
enum LampCommand {
    /// Stay connected and print events until Ctrl-C
    Monitor,
    /// Switch the light on
    On {
        /// Colour as R,G,B
        #[arg(long, value_parser = parse_rgb, default_value = "255,255,255")]
        rgb: Rgb,
        /// Brightness 0-255
        #[arg(long, default_value_t = 255)]
        brightness: u8,
        #[command(flatten)]
        linger: Linger,
    },
    /// Switch the light off
    Off {
        #[command(flatten)]
        linger: Linger,
    },
    /// Set one intensity channel
    Channel {
        /// Channel 1-5
        index: u8,
        /// Intensity 0-255
        value: u16,
        #[command(flatten)]
        linger: Linger,
    },
    /// Send a raw 16-byte payload given as hex
    Raw {
        hex: String,
        #[command(flatten)]
        linger: Linger,
    },
}

#[derive(clap::Args, Debug)]
struct Linger {
    /// How long to keep the session up after queueing the command
    #[arg(long = "linger", default_value = "20s")]
    duration: humantime::Duration,
}

fn parse_rgb(input: &str) -> Result<Rgb, String> {
    let parts = input
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid colour component: {}", e))?;
    match parts.as_slice() {
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => Err(format!("expected R,G,B, got {:?}", input)),
    }
}

impl LampCommand {
    /// Command payload and linger time, `None` for `monitor`
    fn payload(&self) -> anyhow::Result<Option<(Command, Duration)>> {
        let built = match self {
            LampCommand::Monitor => return Ok(None),
            LampCommand::On {
                rgb,
                brightness,
                linger,
            } => (Command::light(*rgb, *brightness), linger.duration),
            LampCommand::Off { linger } => (Command::off(), linger.duration),
            LampCommand::Channel {
                index,
                value,
                linger,
            } => (Command::channel(*index, *value)?, linger.duration),
            LampCommand::Raw { hex, linger } => (
                Command::from_hex(hex).context("raw payload must be 16 bytes of hex")?,
                linger.duration,
            ),
        };
        Ok(Some((built.0, built.1.into())))
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("fluval_lamp={}", args.log_level).parse()?)
        .add_directive(format!("lamp_session={}", args.log_level).parse()?)
        .add_directive(format!("lamp_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(LampLogFormatter::new("fluval-lamp"))
        .init();

    info!("Starting fluval-lamp v{}", env!("CARGO_PKG_VERSION"));

    let mut config = LampConfig::load_from_file(&args.config)?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if !args.addresses.is_empty() {
        config.devices = args
            .addresses
            .iter()
            .map(|a| lamp_session::normalize_address(a))
            .collect();
    }
    if config.devices.is_empty() {
        bail!("no devices configured; pass --address or set devices in {:?}", args.config);
    }

    let mut session = config.session_config();
    if let Some(interval) = args.heartbeat_interval {
        session.heartbeat_interval = interval.into();
    }
    if let Some(ttl) = args.command_ttl {
        session.command_ttl = ttl.into();
    }
    if let Some(cooldown) = args.cooldown {
        session.reconnect_cooldown = cooldown.into();
    }

    let payload = args.command.payload()?;

    let result = match config.backend {
        Backend::Mock => {
            component_info!("cli", "Using simulated lamp backend");
            run(Arc::new(MockTransport::new()), &config.devices, session, payload).await
        }
        #[cfg(feature = "btleplug")]
        Backend::Btleplug => {
            match lamp_session::BtleplugTransport::new(Default::default()).await {
                Ok(transport) => run(Arc::new(transport), &config.devices, session, payload).await,
                Err(e) => Err(e.into()),
            }
        }
        #[cfg(not(feature = "btleplug"))]
        Backend::Btleplug => {
            Err(anyhow::anyhow!(
                "btleplug backend requested but not compiled in. Build with --features btleplug"
            ))
        }
    };
    if let Err(e) = &result {
        component_error!("cli", "{:#}", e);
    }
    result
}

async fn run<T: BleTransport>(
    transport: Arc<T>,
    devices: &[String],
    session: SessionConfig,
    payload: Option<(Command, Duration)>,
) -> anyhow::Result<()> {
    info!(
        "Session config: heartbeat={:?}, command_ttl={:?}, cooldown={:?}",
        session.heartbeat_interval, session.command_ttl, session.reconnect_cooldown
    );
    let (registry, mut handle) = DeviceRegistry::new(transport, session);

    let linger = match payload {
        Some((command, linger)) => {
            for device in devices {
                component_info!("cli", "Queueing {:?} for {}", command, device);
                registry.send(device, command).await;
            }
            Some(linger)
        }
        None => {
            for device in devices {
                registry.get_or_create(device).await;
            }
            None
        }
    };

    match linger {
        Some(linger) => {
            let deadline = tokio::time::sleep(linger);
            tokio::pin!(deadline);
            tokio::select! {
                _ = &mut deadline => {}
                _ = print_events(&mut handle) => {}
                _ = tokio::signal::ctrl_c() => component_info!("cli", "Interrupted"),
            }
        }
        None => {
            tokio::select! {
                _ = print_events(&mut handle) => {}
                result = tokio::signal::ctrl_c() => {
                    result.context("failed to listen for Ctrl-C")?;
                    component_info!("cli", "Shutting down");
                }
            }
        }
    }

    for address in registry.addresses().await {
        if let Some(manager) = registry.get(&address).await {
            let stats = manager.stats();
            component_info!(
                "cli",
                "{}: {} sessions, {} heartbeats, {} commands written, {} expired, {} superseded, {} messages",
                address,
                stats.sessions_established,
                stats.heartbeats,
                stats.commands_written,
                stats.commands_expired,
                stats.commands_superseded,
                stats.messages_delivered
            );
        }
    }
    registry.shutdown_all().await;
    Ok(())
}

async fn print_events(handle: &mut SessionHandle) {
    while let Some(event) = handle.events.recv().await {
        match event {
            SessionEvent::Connected { address } => {
                component_info!("events", "{} connected", address);
            }
            SessionEvent::Disconnected { address, reason } => {
                component_warn!("events", "{} disconnected: {}", address, reason);
            }
            SessionEvent::MessageReceived { address, payload } => {
                component_debug!("events", "{} sent a {} byte message", address, payload.len());
                println!("{} {}", address, to_hex(&payload));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgb() {
        assert_eq!(parse_rgb("10, 20,30"), Ok(Rgb::new(10, 20, 30)));
        assert!(parse_rgb("10,20").is_err());
        assert!(parse_rgb("10,20,300").is_err());
    }

    #[test]
    fn test_cli_builds_commands() {
        let args = Args::parse_from([
            "fluval-lamp",
            "--address",
            "aa:bb:cc:dd:ee:ff",
            "on",
            "--rgb",
            "255,0,0",
            "--brightness",
            "128",
            "--linger",
            "5s",
        ]);
        let (command, linger) = args.command.payload().unwrap().unwrap();
        assert_eq!(command, Command::light(Rgb::new(255, 0, 0), 128));
        assert_eq!(linger, Duration::from_secs(5));
        assert_eq!(args.addresses, vec!["aa:bb:cc:dd:ee:ff"]);

        let args = Args::parse_from(["fluval-lamp", "channel", "6", "10"]);
        assert!(args.command.payload().is_err());

        let args = Args::parse_from(["fluval-lamp", "monitor"]);
        assert!(args.command.payload().unwrap().is_none());
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
