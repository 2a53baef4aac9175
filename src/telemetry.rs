//! Structured-logging setup.
//!
//! Environment variables:
//! - `SECRET_SYNC_LOG_LEVEL`: an `EnvFilter` directive; falls back to
//!   `RUST_LOG`, then to `secret_store_sync=info`.
//! - `SECRET_SYNC_JSON_LOG`: truthy values switch to JSON log lines.
//! - `SECRET_SYNC_LOG_SERVER`: `host:port` UDP target receiving the
//!   formatted log stream instead of stderr.

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "SECRET_SYNC_LOG_LEVEL";
pub const JSON_LOG_ENV: &str = "SECRET_SYNC_JSON_LOG";
pub const LOG_SERVER_ENV: &str = "SECRET_SYNC_LOG_SERVER";

const DEFAULT_DIRECTIVE: &str = "secret_store_sync=info";

/// Sends each formatted log line as one UDP datagram. Transport errors are
/// swallowed so logging can never take the process down.
#[derive(Clone)]
struct UdpWriter {
    socket: Arc<UdpSocket>,
}

impl UdpWriter {
    fn connect(target: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind UDP log socket")?;
        socket
            .connect(target)
            .with_context(|| format!("failed to connect UDP log socket to {target}"))?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }
}

impl io::Write for UdpWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.socket.send(buf) {
            Ok(sent) => Ok(sent),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for UdpWriter {
    type Writer = UdpWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn filter() -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_LEVEL_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&directive) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "y" | "yes" | "on"
    )
}

/// Installs the global tracing subscriber.
pub fn init() -> Result<()> {
    let json = std::env::var(JSON_LOG_ENV)
        .map(|value| truthy(&value))
        .unwrap_or(false);
    let writer = match std::env::var(LOG_SERVER_ENV) {
        Ok(target) if !target.is_empty() => Some(UdpWriter::connect(&target)?),
        _ => None,
    };

    match (json, writer) {
        (true, Some(writer)) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_writer(writer)
            .init(),
        (true, None) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .init(),
        (false, Some(writer)) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(writer)
            .init(),
        (false, None) => tracing_subscriber::fmt().with_env_filter(filter()).init(),
    }

    Ok(())
}
