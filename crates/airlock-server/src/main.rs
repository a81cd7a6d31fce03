//! Airlock server binary.
//!
//! # Usage
//!
//! ```bash
//! # UDP transport (development, or behind a tunnel)
//! airlock-server --bind 0.0.0.0:12345 --path /srv/drop
//!
//! # FunctionFS bulk endpoints on gadget hardware, with an alias
//! airlock-server --usb-out /dev/ffs/ep1 --usb-in /dev/ffs/ep2 \
//!     --path /srv/drop=/xfer-data
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use airlock_server::{
    DEFAULT_BULK_SIZE, DriverConfig, FunctionFsLink, Sandbox, Server, ServerConfig, ServerError,
};

/// Airlock one-way file relay server
#[derive(Parser, Debug)]
#[command(name = "airlock-server")]
#[command(about = "Sandboxed read-only file server for the Airlock relay")]
#[command(version)]
struct Args {
    /// UDP address to bind (ignored when USB endpoints are given)
    #[arg(short, long, default_value = "0.0.0.0:12345")]
    bind: String,

    /// FunctionFS OUT endpoint file (requests arrive here)
    #[arg(long, requires = "usb_in")]
    usb_out: Option<PathBuf>,

    /// FunctionFS IN endpoint file (responses leave here)
    #[arg(long, requires = "usb_out")]
    usb_in: Option<PathBuf>,

    /// USB bulk packet size
    #[arg(long, default_value_t = DEFAULT_BULK_SIZE)]
    bulk_size: usize,

    /// Allowed directory: REAL[=ALIAS[,ALIAS...]] (repeatable)
    #[arg(short, long = "path", required = true)]
    paths: Vec<String>,

    /// Max application payload per packet
    #[arg(long, default_value_t = airlock_proto::DEFAULT_MAX_PACKET)]
    max_packet: usize,

    /// Receive timeout in seconds (blocks forever when omitted)
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Parse one `REAL[=ALIAS[,ALIAS...]]` spec into the sandbox.
fn add_prefix_spec(sandbox: &mut Sandbox, spec: &str) -> Result<(), ServerError> {
    let mut parts = spec.splitn(2, '=');
    let real = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServerError::Config(format!("empty path spec '{spec}'")))?;

    match parts.next() {
        None => sandbox.add_root(real)?,
        Some(aliases) => {
            for alias in aliases.split(',') {
                if alias.is_empty() {
                    return Err(ServerError::Config(format!("empty alias in '{spec}'")));
                }
                sandbox.add_alias(real, alias)?;
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("airlock server starting");

    let mut sandbox = Sandbox::new();
    for spec in &args.paths {
        add_prefix_spec(&mut sandbox, spec)?;
    }

    let config = ServerConfig {
        recv_timeout: args.timeout.map(Duration::from_secs),
        driver: DriverConfig {
            max_packet: args.max_packet,
            ..DriverConfig::default()
        },
    };

    match (&args.usb_out, &args.usb_in) {
        (Some(out_ep), Some(in_ep)) => {
            let link = FunctionFsLink::open(out_ep, in_ep, args.bulk_size)?;
            tracing::info!("serving over usb bulk endpoints");
            Server::new(link, sandbox, config).run().await?;
        },
        _ => {
            let link = airlock_core::UdpLink::bind(&args.bind).await?;
            tracing::info!(bind = %args.bind, "serving over udp");
            Server::new(link, sandbox, config).run().await?;
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_spec_plain_root() {
        let mut sandbox = Sandbox::new();
        add_prefix_spec(&mut sandbox, "/tmp").unwrap();
        assert!(!sandbox.is_empty());
    }

    #[test]
    fn prefix_spec_with_aliases() {
        let mut sandbox = Sandbox::new();
        add_prefix_spec(&mut sandbox, "/tmp=/xfer,/alt").unwrap();
        assert_eq!(sandbox.resolve_alias(b"/xfer/abc"), b"/tmp/abc".to_vec());
        assert_eq!(sandbox.resolve_alias(b"/alt/abc"), b"/tmp/abc".to_vec());
    }

    #[test]
    fn prefix_spec_rejects_empty() {
        let mut sandbox = Sandbox::new();
        assert!(add_prefix_spec(&mut sandbox, "=alias").is_err());
        assert!(add_prefix_spec(&mut sandbox, "/tmp=").is_err());
    }
}
