//! shuttle-ctl: command-line client for the shuttle daemon.
//!
//! Streams files up, waits for the echo and checks it against the source.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;

use shuttle_core::{chunk_count, digest_hex, TransferId};
use shuttle_services::Client;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_ID: TransferId = 1;

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn read_source(path: &Path) -> Result<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

/// Print one transfer's result and report whether the echo matches.
fn report(id: TransferId, source: &Path, sent: &Bytes, echoed: &Bytes) -> bool {
    let sent_digest = digest_hex(sent);
    let echoed_digest = digest_hex(echoed);
    let intact = sent == echoed;

    println!("  ┌─ id {} ({})", id, source.display());
    println!("  │  sent     : {} bytes, {} chunks", sent.len(), chunk_count(sent.len()));
    println!("  │  echoed   : {} bytes", echoed.len());
    println!("  │  blake3   : {}", &sent_digest[..16]);
    if intact {
        println!("  └─ result   : intact");
    } else {
        println!("  │  echo b3  : {}", &echoed_digest[..16]);
        println!("  └─ result   : MISMATCH");
    }
    intact
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_single(addr: &str, id: TransferId, path: PathBuf) -> Result<bool> {
    let data = read_source(&path).await?;
    let started = Instant::now();
    let echo = Client::new(addr).single(id, &data).await?;
    let elapsed = started.elapsed();

    println!("═══════════════════════════════════════");
    println!("  Single Transfer");
    println!("═══════════════════════════════════════");
    let mut intact = report(id, &path, &data, &echo.data);
    if echo.id != id {
        println!("  Echo came back under id {} (sent {}).", echo.id, id);
        intact = false;
    }
    println!("  Round trip: {:.1} ms", elapsed.as_secs_f64() * 1000.0);
    Ok(intact)
}

async fn cmd_multiple(addr: &str, paths: Vec<PathBuf>) -> Result<bool> {
    let mut items = Vec::with_capacity(paths.len());
    for (n, path) in paths.iter().enumerate() {
        items.push((n as TransferId + 1, read_source(path).await?));
    }

    let started = Instant::now();
    let echoed = Client::new(addr).multiple(&items).await?;
    let elapsed = started.elapsed();

    println!("═══════════════════════════════════════");
    println!("  Multiplexed Transfer ({} files)", items.len());
    println!("═══════════════════════════════════════");
    let mut intact = true;
    for ((id, data), path) in items.iter().zip(&paths) {
        let back = echoed.get(id).cloned().unwrap_or_default();
        intact &= report(*id, path, data, &back);
    }
    let unexpected = echoed.len().saturating_sub(items.len());
    if unexpected > 0 {
        println!("  {} unexpected identifiers in echo.", unexpected);
        intact = false;
    }
    println!("  Round trip: {:.1} ms", elapsed.as_secs_f64() * 1000.0);
    Ok(intact)
}

fn print_usage() {
    println!("Usage: shuttle-ctl [--addr <host:port>] <command>");
    println!();
    println!("Commands:");
    println!("  single [--id <n>] <file>   Stream one file and verify the echo");
    println!("  multiple <file>...         Stream files interleaved (ids 1..n) and verify");
    println!();
    println!("Options:");
    println!("  --addr <host:port>   Daemon address (default: {})", DEFAULT_ADDR);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --addr and --id options
    let mut addr = DEFAULT_ADDR.to_string();
    let mut id = DEFAULT_ID;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" => {
                i += 1;
                addr = args.get(i).context("--addr requires a value")?.clone();
            }
            "--id" => {
                i += 1;
                id = args
                    .get(i)
                    .context("--id requires a value")?
                    .parse()
                    .context("--id must be a number")?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let intact = match remaining.as_slice() {
        ["single", file] => cmd_single(&addr, id, PathBuf::from(file)).await?,
        ["multiple", files @ ..] if !files.is_empty() => {
            cmd_multiple(&addr, files.iter().map(PathBuf::from).collect()).await?
        }
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            return Ok(());
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if !intact {
        eprintln!("Echo did not match the source.");
        std::process::exit(1);
    }
    Ok(())
}
