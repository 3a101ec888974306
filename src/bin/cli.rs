//! RingKV CLI
//!
//! Interactive shell over an embedded engine, for manual testing.
//!
//! ```text
//! > set <key> <value>
//! > get <key>
//! > quit
//! ```

use std::io::{self, BufRead, Write};

use clap::Parser;
use ringkv::{Config, EngineRace};
use tracing_subscriber::{fmt, EnvFilter};

/// RingKV CLI
#[derive(Parser, Debug)]
#[command(name = "ringkv-cli")]
#[command(about = "Interactive shell for the RingKV storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./ringkv_data")]
    data_dir: String,

    /// Number of journal slots
    #[arg(short, long, default_value = "128")]
    journal_capacity: usize,
}

fn main() {
    // Logs go to stderr so they don't interleave with command output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ringkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("RingKV v{}", ringkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .journal_capacity(args.journal_capacity)
        .journal_backoff(args.journal_capacity / 8)
        .build();

    let engine = match EngineRace::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };

        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("quit"), _, _) => break,
            (Some("set"), Some(key), Some(value)) => match engine.write(key.as_bytes(), value.as_bytes()) {
                Ok(()) => println!("Out: Ok"),
                Err(e) => println!("Err: {}", e),
            },
            (Some("get"), Some(key), None) => match engine.read(key.as_bytes()) {
                Ok(value) => println!("Out: {}", String::from_utf8_lossy(&value)),
                Err(e) if e.is_not_found() => println!("Err: Not Found"),
                Err(e) => println!("Err: {}", e),
            },
            (None, _, _) => continue,
            (Some(command), _, _) => println!("Err: Unknown command: {}", command),
        }
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        std::process::exit(1);
    }
}
