//! Airlock relay server.
//!
//! Serves read-only filesystem queries (list, stat, get, hash,
//! readlink) to the isolated side of a one-way relay, over a
//! constrained datagram link. Filesystem access is confined to an
//! allowlist of directory prefixes.
//!
//! # Architecture
//!
//! [`ServerDriver`] is the sans-IO protocol engine: frame in, frame
//! out, no transport knowledge. [`Server`] is the production runtime
//! that pumps a [`Link`] through the driver and runs the stat-cache
//! ticker. Transports: UDP (via `airlock-core`) for tunneled setups
//! and [`FunctionFsLink`] for real gadget hardware.
//!
//! The protocol is half-duplex request/response, so the runtime is a
//! plain sequential loop; the only concurrent piece is the once-a-
//! second cache tick.

#![forbid(unsafe_code)]

mod driver;
mod error;
mod fsops;
mod sandbox;
mod slots;
mod stat_cache;
mod transport;

use std::time::Duration;

pub use driver::{DriverConfig, Reply, ServerDriver};
pub use error::ServerError;
pub use sandbox::Sandbox;
pub use slots::{DEFAULT_PURGE_AFTER, SlotPool, SlotState};
pub use stat_cache::StatCache;
pub use transport::{DEFAULT_BULK_SIZE, FunctionFsLink};

use airlock_core::{Link, LinkError};

/// Runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// How long one `recv` may block; `None` blocks until a frame
    /// arrives.
    pub recv_timeout: Option<Duration>,
    /// Engine tuning.
    pub driver: DriverConfig,
}

/// Production server: a link pumped through the protocol engine.
pub struct Server<L: Link> {
    link: L,
    driver: ServerDriver,
    recv_timeout: Option<Duration>,
}

impl<L: Link> Server<L> {
    /// Build a server over `link`, serving paths allowed by `sandbox`.
    ///
    /// The engine adopts the link's current max packet size, ignoring
    /// whatever `config.driver` says, so fragmentation always matches
    /// what the transport can carry.
    pub fn new(mut link: L, sandbox: Sandbox, config: ServerConfig) -> Self {
        let max_packet = link.set_max_packet(config.driver.max_packet);
        let driver_config = DriverConfig { max_packet, ..config.driver };

        Self {
            link,
            driver: ServerDriver::new(sandbox, &driver_config),
            recv_timeout: config.recv_timeout,
        }
    }

    /// Serve until the link dies.
    ///
    /// # Errors
    ///
    /// Returns once the transport reports a fatal condition.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!(max_packet = self.driver.max_packet(), "server running");

        let cache = self.driver.cache();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                cache.tick();
            }
        });

        let result = loop {
            if let Err(e) = self.serve_one().await {
                break Err(e);
            }
        };

        ticker.abort();
        result
    }

    /// Receive one frame, drive the engine, transmit the reply.
    ///
    /// A receive timeout is a no-op (the loop just comes around); a
    /// failed reply write releases any slot the reply had opened.
    ///
    /// # Errors
    ///
    /// Fatal transport errors only.
    pub async fn serve_one(&mut self) -> Result<(), ServerError> {
        let Some(frame) = self.link.recv(self.recv_timeout).await? else {
            tracing::trace!("receive window elapsed");
            return Ok(());
        };

        let reply = self.driver.handle_frame(&frame);

        match self.link.send(&reply.frame).await {
            Ok(()) => Ok(()),
            Err(LinkError::Write(error)) => {
                tracing::warn!(%error, "dropping reply: transport write failed");
                if let Some(slot) = reply.open_slot {
                    self.driver.release_slot(slot);
                }
                Ok(())
            },
            Err(fatal) => Err(fatal.into()),
        }
    }

    /// Engine access for tests and diagnostics.
    #[must_use]
    pub fn driver(&self) -> &ServerDriver {
        &self.driver
    }
}
