use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};

use biolink::connection::{ConnectionManager, LinkConfig};
use biolink::prelude::BtleplugTransport;
use biolink::protocol::{DEFAULT_NAME_PREFIX, DEFAULT_SCAN_DURATION};
use biolink::types::{LinkEvent, WearStatus};

/// Connect to the first matching headband and stream its telemetry.
#[derive(Parser, Debug)]
#[command(name = "biolink", version, about)]
struct Args {
    /// Connect to devices whose advertised name starts with this.
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    prefix: String,

    /// Give up scanning after this many seconds.
    #[arg(long, default_value_t = DEFAULT_SCAN_DURATION.as_secs())]
    scan_secs: u64,
}

impl Args {
    fn into_config(self) -> LinkConfig {
        LinkConfig {
            name_prefix: self.prefix,
            scan_duration: Duration::from_secs(self.scan_secs),
            ..LinkConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG=biolink=debug for per-frame detail.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    // ── Connect ───────────────────────────────────────────────────────────────
    let transport = BtleplugTransport::new().await?;
    let mut link = ConnectionManager::new(transport, config);

    info!("Looking for a headband named '{}*' …", link.config().name_prefix);
    let record = link.connect_first().await?;
    info!("Connected to {}", record.name.as_deref().unwrap_or(&record.id));
    info!("Commands (type + Enter):");
    info!("  s  – start recording");
    info!("  t  – stop recording and print the snapshot");
    info!("  c  – clear the recording");
    info!("  d  – disconnect");
    info!("  q  – quit\n");

    // ── Stdin command relay ───────────────────────────────────────────────────
    // Lines are read on a plain thread so the blocking StdinLock never sits
    // inside the async runtime.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                match line.as_str() {
                    "" => {}
                    "s" => {
                        link.start_session();
                        info!("Recording …");
                    }
                    "t" => {
                        let snapshot = link.stop_session();
                        match snapshot.to_json() {
                            Ok(json) => println!("{json}"),
                            Err(e) => error!("Snapshot serialisation failed: {e}"),
                        }
                    }
                    "c" => {
                        link.clear_session();
                        info!("Recording cleared.");
                    }
                    "d" | "q" => {
                        if let Err(e) = link.disconnect().await {
                            warn!("Disconnect: {e}");
                        }
                        break;
                    }
                    other => warn!("Unknown command '{other}'"),
                }
            }
            event = link.next_event() => {
                let Some(event) = event else { break };
                match event {
                    LinkEvent::Metrics(m) => {
                        let wear = match m.wear {
                            WearStatus::Worn => "worn",
                            WearStatus::NotWorn => "NOT WORN",
                            WearStatus::Unknown => "?",
                        };
                        println!("[LIVE]   focus={:3}  relax={:3}  ({wear})", m.focus, m.relax);
                    }
                    LinkEvent::Sample(s) => {
                        println!(
                            "[SAMPLE] δ={} θ={} α={}/{} β={}/{} γ={}/{}",
                            s.delta, s.theta, s.low_alpha, s.high_alpha,
                            s.low_beta, s.high_beta, s.low_gamma, s.high_gamma
                        );
                    }
                    LinkEvent::PossibleDrop => warn!("No telemetry for a while – link may have dropped."),
                    LinkEvent::Disconnected(reason) => {
                        info!("Disconnected ({reason:?}).");
                        break;
                    }
                    LinkEvent::DeviceDiscovered(_) | LinkEvent::ScanFinished(_) => {}
                }
            }
        }
    }

    let d = link.diagnostics();
    info!(
        "Frames: {} notifications, {} full samples, {} invalid, {} orphaned second segments.",
        d.notifications, d.full_samples, d.invalid_frames, d.orphan_second_segments
    );
    Ok(())
}
