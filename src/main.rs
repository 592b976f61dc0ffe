//! Tunnel forwarder CLI application

use std::fmt::Display;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tunnel_forwarder::adapter::TunDevice;
use tunnel_forwarder::config::io::load_json;
use tunnel_forwarder::{
    net, DeviceKind, DownlinkExit, Role, RunnerConfig, Session, TunnelConfig, TunnelRunner,
};

#[derive(Parser)]
#[command(name = "tunnel-forwarder")]
#[command(about = "Point-to-point TUN/TAP tunnel over TCP")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "Exit status: 0 after -h or when the peer closes the connection, \
1 on usage errors and fatal tunnel errors. Unlike the classic C tool, -h exits 0.")]
struct Cli {
    /// Name of the TUN/TAP interface to use (mandatory)
    #[arg(short = 'i', value_name = "IFACENAME")]
    interface: Option<String>,

    /// Run in server mode
    #[arg(short = 's', conflicts_with = "client")]
    server: bool,

    /// Run in client mode, connecting to SERVERIP
    #[arg(short = 'c', value_name = "SERVERIP")]
    client: Option<String>,

    /// Port to listen on (server) or connect to (client) [default: 55555]
    #[arg(short = 'p', value_name = "PORT")]
    port: Option<u16>,

    /// Use a TUN device (default)
    #[arg(short = 'u', conflicts_with = "tap")]
    tun: bool,

    /// Use a TAP device
    #[arg(short = 'a')]
    tap: bool,

    /// Output debug information
    #[arg(short = 'd')]
    debug: bool,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// Padding interval for the client uplink, in microseconds
    #[arg(long, value_name = "US")]
    pad_interval_us: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let usage = Cli::command().render_usage();
            report_error(&mut io::stderr(), format!("{e:#}\n\n{usage}"));
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cli.debug);

    match run(config).await {
        Ok(exit) => {
            info!(?exit, "Tunnel session ended");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Tunnel session error: {e:#}");
            report_error(&mut io::stderr(), format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing. Priority: RUST_LOG, then the -d flag, then info.
fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

/// Build the effective configuration: config file first, then flags on top.
fn resolve_config(cli: &Cli) -> Result<TunnelConfig> {
    let mut config = match &cli.config {
        Some(path) => load_json(path)
            .with_context(|| format!("Failed to load configuration from: {path}"))?,
        None => {
            let interface = cli.interface.clone().unwrap_or_default();
            match (&cli.client, cli.server) {
                (Some(addr), _) => TunnelConfig::client(interface, addr.clone()),
                (None, true) => TunnelConfig::server(interface),
                (None, false) => bail!("Must specify client or server mode"),
            }
        }
    };

    if let Some(interface) = &cli.interface {
        config.interface = interface.clone();
    }
    if let Some(addr) = &cli.client {
        config.role = Role::Client;
        config.server = Some(addr.clone());
    } else if cli.server {
        config.role = Role::Server;
        config.server = None;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.tap {
        config.device_kind = DeviceKind::Tap;
    } else if cli.tun {
        config.device_kind = DeviceKind::Tun;
    }
    if let Some(us) = cli.pad_interval_us {
        config.pacing.interval_us = us;
    }

    config.validate()?;
    Ok(config)
}

/// Allocate the device, establish the connection and relay until the session ends.
async fn run(config: TunnelConfig) -> Result<DownlinkExit> {
    let device = TunDevice::open(&config.interface, config.device_kind)
        .with_context(|| format!("Failed to allocate interface {}", config.interface))?;
    info!(
        "Successfully connected to interface {} ({})",
        config.interface, config.device_kind
    );
    debug!(fd = device.raw_fd(), "Device descriptor");

    let stream = match config.role {
        Role::Client => {
            let server = config.server.as_deref().unwrap_or_default();
            net::connect(server, config.port, config.nodelay)
                .await
                .with_context(|| format!("Failed to connect to {server}:{}", config.port))?
        }
        Role::Server => net::accept(config.port, config.nodelay)
            .await
            .with_context(|| format!("Failed to accept a client on port {}", config.port))?,
    };

    let runner = TunnelRunner::new(RunnerConfig::new(config.role, &config.pacing));
    let session = Session::from_tcp(Arc::new(device), stream);
    Ok(runner.run(session).await?)
}

/// Print a fatal message. A closed stderr must not change the exit status.
fn report_error(out: &mut impl Write, msg: impl Display) {
    let _ = writeln!(out, "error: {msg}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tunnel-forwarder").chain(args.iter().copied()))
    }

    #[test]
    fn test_client_defaults() {
        let cli = parse(&["-i", "tun0", "-c", "10.0.0.1"]).unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.server.as_deref(), Some("10.0.0.1"));
        assert_eq!(config.port, 55555);
        assert_eq!(config.device_kind, DeviceKind::Tun);
    }

    #[test]
    fn test_server_with_port_and_tap() {
        let cli = parse(&["-i", "tap0", "-s", "-p", "4000", "-a", "-d"]).unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.server, None);
        assert_eq!(config.port, 4000);
        assert_eq!(config.device_kind, DeviceKind::Tap);
        assert!(cli.debug);
    }

    #[test]
    fn test_missing_interface_rejected() {
        let cli = parse(&["-s"]).unwrap();
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn test_missing_role_rejected() {
        let cli = parse(&["-i", "tun0"]).unwrap();
        let err = resolve_config(&cli).unwrap_err();
        assert!(err.to_string().contains("client or server"));
    }

    #[test]
    fn test_server_and_client_conflict() {
        let err = parse(&["-i", "tun0", "-s", "-c", "10.0.0.1"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_tun_and_tap_conflict() {
        let err = parse(&["-i", "tun0", "-s", "-u", "-a"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_unknown_flag_and_stray_argument_rejected() {
        assert!(parse(&["-i", "tun0", "-s", "-x"]).is_err());
        assert!(parse(&["-i", "tun0", "-s", "extra"]).is_err());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = parse(&["-h"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunnel.json");
        std::fs::write(
            &path,
            r#"{"interface":"tun9","role":"server","port":1000,"device_kind":"tun"}"#,
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let cli = parse(&["--config", path, "-p", "2000", "-a", "--pad-interval-us", "750"]).unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.interface, "tun9");
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.port, 2000);
        assert_eq!(config.device_kind, DeviceKind::Tap);
        assert_eq!(config.pacing.interval_us, 750);

        let cli = parse(&["--config", path, "-i", "tun1", "-c", "192.0.2.7"]).unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.interface, "tun1");
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.server.as_deref(), Some("192.0.2.7"));
        assert_eq!(config.port, 1000);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_report_error_survives_closed_stderr() {
        report_error(&mut ClosedPipe, "Transport connection broken");

        let mut out = Vec::new();
        report_error(&mut out, "boom");
        assert_eq!(out, b"error: boom\n");
    }
}
