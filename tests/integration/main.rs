//! Shuttle integration test harness.
//!
//! Every test starts its own server on 127.0.0.1:0 backed by a FileStore in
//! a private temp directory, and talks to it over real TCP:
//!
//!   cargo test --test integration
//!
//! Tests run concurrently; nothing here is shared between them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use shuttle_core::{CallHeader, Method};
use shuttle_services::{Client, FileStore, Server};

mod failures;
mod multiple;
mod single;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const EXTENSION: &str = "bin";

/// A running server and the directory it persists into.
pub struct TestServer {
    pub addr: SocketAddr,
    pub root: PathBuf,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    /// Start a server whose store lives under a directory named after `tag`.
    pub async fn start(tag: &str) -> Result<Self> {
        let root = std::env::temp_dir().join(format!(
            "shuttle-it-{tag}-{}",
            std::process::id()
        ));
        std::fs::remove_dir_all(&root).ok();
        let store = FileStore::new(&root, EXTENSION).context("failed to create store")?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = Server::new(Arc::new(store)).with_shutdown_grace(Duration::from_secs(2));
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        Ok(Self {
            addr,
            root,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    pub fn client(&self) -> Client {
        Client::new(self.addr.to_string())
    }

    /// Bytes persisted under `key`, if the file exists.
    pub fn stored(&self, key: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root.join(format!("{key}.{EXTENSION}"))).ok()
    }

    /// Names of every persisted file, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        list_dir(&self.root)
    }

    /// Open a raw connection and send the call preamble for `method`.
    pub async fn open_call(&self, method: Method) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream
            .write_all(&CallHeader::new(method).to_bytes())
            .await?;
        Ok(stream)
    }

    /// Request shutdown and wait for the accept loop to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(10), task)
                .await
                .context("server did not stop")??
                .context("server failed")?;
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        std::fs::remove_dir_all(&self.root).ok();
    }
}

fn list_dir(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Deterministic test payload.
pub fn pattern(len: usize, seed: u8) -> Bytes {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect::<Vec<u8>>()
        .into()
}

/// Read until the server closes the connection. Returns how many bytes
/// arrived first; a reset counts as closed.
pub async fn read_until_closed(stream: &mut TcpStream) -> usize {
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
    match read {
        Ok(_) => buf.len(),
        Err(_) => panic!("server kept the connection open"),
    }
}
