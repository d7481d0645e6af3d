//! # Ember Loopback
//!
//! Runs two [`Peer`]s against each other through an in-memory channel that
//! drops datagrams at random, and reports what survived. Handy for checking
//! how much loss the repetition scheme absorbs for a given chunk size.
//!
//! ## Usage
//!
//! ```bash
//! # 10% loss each way, default config
//! ember-loopback --loss 0.1
//!
//! # Small chunks, reproducible run
//! ember-loopback --config ember.toml --nals 5000 --nal-size 3000 --seed 7
//! ```

use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Serialize;

use ember_transport::stats::{ReceiverStats, SenderStats};
use ember_transport::{Peer, ReceiverEvent, TransportConfig};

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config '{}': {}", path, e))?;
            TransportConfig::from_toml_str(&text)?
        }
        None => TransportConfig::default(),
    };

    tracing::info!(
        nals = args.nals,
        nal_size = args.nal_size,
        loss = args.loss,
        seed = args.seed,
        chunk_window = config.chunk_window,
        max_chunk_payload = config.max_chunk_payload,
        "ember-loopback starting"
    );

    // ── Link ────────────────────────────────────────────────────
    let mut camera = Peer::new(&config);
    let mut display = Peer::new(&config);
    let mut channel = LossyChannel::new(args.loss, args.seed);

    let mut delivered = 0u64;
    let mut corrupt = 0u64;
    let log_every = (args.nals / 10).max(1);

    for index in 0..args.nals {
        camera.push_nal(&synthetic_nal(index, args.nal_size));

        while let Some(datagram) = camera.poll_transmit() {
            if channel.pass() {
                let _ = display.receive(&datagram);
            }
        }
        let feedback = display.heartbeat();
        if channel.pass() {
            let _ = camera.receive(&feedback);
        }

        for event in display.drain_events() {
            if let ReceiverEvent::Deliver(nal) = event {
                delivered += 1;
                if nal.data[..] != synthetic_nal(nal.nal_index, args.nal_size)[..] {
                    corrupt += 1;
                    tracing::error!(nal = nal.nal_index, "delivered NAL does not match");
                }
            }
        }

        if (index + 1) % log_every == 0 {
            let tx = camera.sender().stats();
            let rx = display.receiver().stats();
            tracing::info!(
                pushed = index + 1,
                delivered,
                packets = tx.packets_sent,
                dropped = channel.dropped,
                duplicates = rx.chunks_duplicate,
                resyncs = rx.resyncs,
                holes_skipped = rx.holes_skipped,
                "loopback progress"
            );
        }
    }

    // ── Report ──────────────────────────────────────────────────
    let report = Report {
        nals_pushed: args.nals as u64,
        nals_delivered: delivered,
        nals_corrupt: corrupt,
        datagrams_dropped: channel.dropped,
        sender: camera.sender().stats().clone(),
        receiver: display.receiver().stats().clone(),
    };
    tracing::info!(
        delivered,
        corrupt,
        loss_rate = report.sender.loss_rate(),
        redundancy = report.sender.redundancy_ratio(),
        "ember-loopback finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if corrupt > 0 {
        anyhow::bail!("{corrupt} NAL units were delivered corrupted");
    }
    Ok(())
}

#[derive(Serialize)]
struct Report {
    nals_pushed: u64,
    nals_delivered: u64,
    nals_corrupt: u64,
    datagrams_dropped: u64,
    sender: SenderStats,
    receiver: ReceiverStats,
}

/// NAL whose bytes identify it: big-endian index, then a fill byte.
fn synthetic_nal(index: u32, size: usize) -> Vec<u8> {
    let mut nal = vec![index as u8; size.max(4)];
    nal[..4].copy_from_slice(&index.to_be_bytes());
    nal
}

struct LossyChannel {
    rng: StdRng,
    loss: f64,
    dropped: u64,
}

impl LossyChannel {
    fn new(loss: f64, seed: u64) -> Self {
        LossyChannel {
            rng: StdRng::seed_from_u64(seed),
            loss,
            dropped: 0,
        }
    }

    fn pass(&mut self) -> bool {
        if self.rng.random::<f64>() < self.loss {
            self.dropped += 1;
            false
        } else {
            true
        }
    }
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct Args {
    config: Option<String>,
    nals: u32,
    nal_size: usize,
    loss: f64,
    seed: u64,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = None;
    let mut nals = 1000u32;
    let mut nal_size = 1400usize;
    let mut loss = 0.05f64;
    let mut seed = 1u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                config = Some(
                    args.get(i)
                        .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?
                        .clone(),
                );
            }
            "--nals" | "-n" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--nals requires a value"))?;
                nals = val
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid NAL count '{}': {}", val, e))?;
            }
            "--nal-size" | "-s" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--nal-size requires a value"))?;
                nal_size = val
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid NAL size '{}': {}", val, e))?;
            }
            "--loss" | "-l" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--loss requires a value"))?;
                loss = val
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid loss '{}': {}", val, e))?;
                if !(0.0..=1.0).contains(&loss) {
                    anyhow::bail!("--loss must be between 0 and 1, got {loss}");
                }
            }
            "--seed" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--seed requires a value"))?;
                seed = val
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid seed '{}': {}", val, e))?;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nRun with --help for usage.");
            }
        }
        i += 1;
    }

    Ok(Args {
        config,
        nals,
        nal_size,
        loss,
        seed,
    })
}

fn print_help() {
    eprintln!(
        r#"ember-loopback: two transport peers over a lossy in-memory channel

USAGE:
  ember-loopback [OPTIONS]

OPTIONS:
  --config, -c <path>     Transport config TOML (defaults built in)
  --nals, -n <count>      NAL units to push (default: 1000)
  --nal-size, -s <bytes>  Size of each synthetic NAL unit (default: 1400)
  --loss, -l <0..1>       Datagram drop probability, each direction (default: 0.05)
  --seed <u64>            Channel RNG seed (default: 1)
  --help, -h              Show this help

ENVIRONMENT:
  RUST_LOG                Log filter (default: info)
"#
    );
}
