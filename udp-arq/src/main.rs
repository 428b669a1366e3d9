//! Entry point for `udp-arq`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, address resolution, exit status).

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};

use udp_arq::config::DEFAULT_FINAL_RETRY_BUDGET;
use udp_arq::sender_engine::load_file;
use udp_arq::{
    ArqVariant, ReceiverConfig, ReceiverEngine, SenderConfig, SenderEngine, TransferError,
};

/// Reliable file transfer over UDP (Go-Back-N / Selective-Repeat).
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file and report throughput.
    Send {
        /// Receiver host name or address.
        host: String,
        /// Receiver UDP port.
        port: u16,
        /// File to send.
        file: PathBuf,
        /// Retransmission timeout in milliseconds.
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        retry_timeout_ms: u64,
        /// Maximum packets in flight.
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        window_size: u32,
        /// ARQ variant: gbn or sr.
        #[arg(long, default_value = "gbn")]
        arq: ArqVariant,
        /// Retransmission rounds allowed once the final packet is out.
        #[arg(long, default_value_t = DEFAULT_FINAL_RETRY_BUDGET)]
        final_retries: u32,
    },
    /// Receive one file and write it to disk.
    Receive {
        /// Local UDP port to listen on.
        port: u16,
        /// Where to write the received file.
        file: PathBuf,
        /// ARQ variant: gbn or sr.
        #[arg(long, default_value = "gbn")]
        arq: ArqVariant,
        /// Sender window size (sizes the Selective-Repeat closing burst).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        window_size: Option<u32>,
        /// Give up after this many milliseconds without a packet.
        #[arg(long)]
        idle_timeout_ms: Option<u64>,
        /// Maximum bytes to buffer for the output file.
        #[arg(long)]
        capacity: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match run(cli.mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<TransferError>()
                .map_or(1, TransferError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(mode: Mode) -> anyhow::Result<()> {
    match mode {
        Mode::Send {
            host,
            port,
            file,
            retry_timeout_ms,
            window_size,
            arq,
            final_retries,
        } => {
            // Size check and read happen before any socket exists.
            let data = load_file(&file).await?;

            let remote = resolve(&host, port).await?;
            let config = SenderConfig::new(
                remote,
                Duration::from_millis(retry_timeout_ms),
                window_size,
                arq,
            )
            .with_final_retry_budget(final_retries);

            log::info!("Sending {} to {remote}", file.display());
            let mut engine = SenderEngine::bind(config).await?;
            let report = engine.send_bytes(&data).await?;

            println!(
                "Sent {} bytes in {:.3} s ({} retransmissions)",
                report.bytes,
                report.elapsed.as_secs_f64(),
                report.retransmissions
            );
            println!(
                "Throughput: {:.0} B/s ({:.2} KB/s)",
                report.throughput(),
                report.throughput_kbps()
            );
        }
        Mode::Receive {
            port,
            file,
            arq,
            window_size,
            idle_timeout_ms,
            capacity,
        } => {
            let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            let mut config = ReceiverConfig::new(bind, arq);
            if let Some(w) = window_size {
                config = config.with_window_size(w);
            }
            if let Some(ms) = idle_timeout_ms {
                config = config.with_idle_timeout(Duration::from_millis(ms));
            }
            if let Some(c) = capacity {
                config = config.with_output_capacity(c);
            }

            log::info!("Receiving into {} on port {port}", file.display());
            let mut engine = ReceiverEngine::bind(config).await?;
            let report = engine.receive_file(&file).await?;

            println!(
                "Received {} bytes ({} chunks, {} duplicates) from {}",
                report.bytes, report.chunks, report.duplicates, report.peer
            );
        }
    }
    Ok(())
}

/// Resolve `host:port`.  The receiver listens on IPv4 only, so an IPv4
/// result wins over an earlier IPv6 one.
async fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {host}:{port}"))?;
    prefer_ipv4(addrs).ok_or_else(|| anyhow!("{host}:{port} did not resolve to any address"))
}

fn prefer_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}
