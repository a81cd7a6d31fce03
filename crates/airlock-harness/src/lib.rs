//! End-to-end test harness for the Airlock relay.
//!
//! [`RelayPair`] stands up the real pieces with no transport fakery
//! beyond an in-memory link: a temp-dir sandbox, the production
//! [`airlock_server::Server`] runtime on one end of a loopback pair,
//! and a [`airlock_client::Client`] on the other. Tests drive the
//! client and assert on what comes back.

#![forbid(unsafe_code)]

use std::{fs, path::PathBuf, time::Duration};

use airlock_client::Client;
use airlock_core::LoopbackLink;
use airlock_server::{DriverConfig, Sandbox, Server, ServerConfig};

/// Client receive window used by harness tests. Long enough for a
/// loopback round trip, short enough that negative tests stay quick.
pub const CLIENT_TIMEOUT: Duration = Duration::from_millis(500);

/// A live client/server pair over a loopback link.
pub struct RelayPair {
    dir: tempfile::TempDir,
    /// Client end, already connected and negotiated.
    pub client: Client<LoopbackLink>,
    server: tokio::task::JoinHandle<()>,
}

impl RelayPair {
    /// Stand up a pair with the default packet size.
    ///
    /// # Panics
    ///
    /// Panics on fixture setup failure (tests only).
    pub async fn start() -> Self {
        Self::start_with(DriverConfig::default()).await
    }

    /// Stand up a pair with explicit driver tuning.
    ///
    /// # Panics
    ///
    /// Panics on fixture setup failure (tests only).
    pub async fn start_with(config: DriverConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();

        let mut sandbox = Sandbox::new();
        sandbox.add_root(&data).unwrap();

        let (client_link, server_link) = LoopbackLink::pair_with_max_packet(config.max_packet);

        let server = Server::new(server_link, sandbox, ServerConfig {
            recv_timeout: None,
            driver: config,
        });
        let server = tokio::spawn(async move {
            if let Err(error) = server.run().await {
                tracing::debug!(%error, "harness server stopped");
            }
        });

        let client = Client::connect(client_link, CLIENT_TIMEOUT)
            .await
            .unwrap();

        Self { dir, client, server }
    }

    /// The sandbox root on disk.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Wire path (bytes) for a location under the sandbox root.
    #[must_use]
    pub fn wire_path(&self, relative: &str) -> Vec<u8> {
        use std::os::unix::ffi::OsStrExt;

        let mut joined = self.data_dir();
        if !relative.is_empty() {
            joined.push(relative);
        }
        joined.as_os_str().as_bytes().to_vec()
    }

    /// Create a file under the sandbox root.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure (tests only).
    pub fn write_file(&self, relative: &str, contents: &[u8]) {
        let path = self.data_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    /// Stage a code directory the way the upload front-end does:
    /// content file plus `.meta` and `.headers` dotfiles.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure (tests only).
    pub fn seed_code(&self, code: &str, filename: &str, contents: &[u8], headers: &str) {
        let dir = self.data_dir().join(code);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(filename), contents).unwrap();
        fs::write(dir.join(".meta"), b"source=harness\n").unwrap();
        fs::write(dir.join(".headers"), headers).unwrap();
    }
}

impl Drop for RelayPair {
    fn drop(&mut self) {
        self.server.abort();
    }
}
