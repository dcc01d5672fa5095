//! One task per interface: opens a live capture handle, decodes frames, and
//! reports kernel drop counters on a fixed interval.
//!
//! Capture reads are blocking kernel calls, so the loop itself runs on the
//! runtime's blocking thread pool rather than fighting the async scheduler.

use crate::config::CaptureConfig;
use crate::decode;
use crate::error::NetwatchError;
use crate::session::SessionManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REOPEN_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const REOPEN_BACKOFF_MAX: Duration = Duration::from_secs(8);
const READ_TIMEOUT_MS: i32 = 1000;

/// Opens a live capture on `interface`. Failure here is fatal only for this
/// interface; callers keep other interfaces running.
fn open_capture(interface: &str, config: &CaptureConfig) -> Result<pcap::Capture<pcap::Active>, NetwatchError> {
    let device = pcap::Device::list()
        .map_err(|e| NetwatchError::Config {
            message: format!("listing devices failed: {e}"),
        })?
        .into_iter()
        .find(|d| d.name == interface)
        .ok_or_else(|| NetwatchError::Config {
            message: format!("unknown interface: {interface}"),
        })?;

    let cap = pcap::Capture::from_device(device)
        .map_err(|e| NetwatchError::Permission {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?
        .promisc(false)
        .snaplen(config.snaplen)
        .buffer_size(config.buffer_size)
        .timeout(READ_TIMEOUT_MS)
        .open()
        .map_err(|e| NetwatchError::Permission {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;

    Ok(cap)
}

/// Runs the capture loop for `interface` until `shutdown` flips to `true`.
/// Spawned onto the blocking pool by [`run_packet_source`]; reopens the
/// handle with exponential backoff on transient read errors.
fn capture_loop(interface: String, config: Arc<CaptureConfig>, session: Arc<SessionManager>, shutdown: Arc<AtomicBool>) {
    let mut backoff = REOPEN_BACKOFF_INITIAL;

    'reopen: while !shutdown.load(Ordering::Relaxed) {
        let mut cap = match open_capture(&interface, &config) {
            Ok(cap) => {
                backoff = REOPEN_BACKOFF_INITIAL;
                cap
            }
            Err(err) => {
                warn!(interface, %err, "failed to open capture handle");
                return;
            }
        };

        let mut last_sample = Instant::now();
        let mut total_packets: u64 = 0;
        let mut total_drops: u64 = 0;

        while !shutdown.load(Ordering::Relaxed) {
            match cap.next_packet() {
                Ok(packet) => {
                    total_packets += 1;
                    if let Some(frame) = decode::decode(packet.data) {
                        session.handle_frame(&interface, &frame);
                    } else {
                        debug!(
                            interface,
                            hex = %hex::encode(&packet.data[..packet.data.len().min(32)]),
                            "frame not decodable"
                        );
                    }
                }
                Err(pcap::Error::TimeoutExpired) => {}
                Err(err) => {
                    warn!(interface, %err, "capture read error, reopening");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(REOPEN_BACKOFF_MAX);
                    continue 'reopen;
                }
            }

            if last_sample.elapsed() >= config.drop_sample_interval {
                if let Ok(stats) = cap.stats() {
                    let drops = stats.dropped as u64;
                    let delta = drops.saturating_sub(total_drops);
                    total_drops = drops;
                    let ratio = if total_packets + total_drops > 0 {
                        total_drops as f64 / (total_packets + total_drops) as f64
                    } else {
                        0.0
                    };
                    if delta > 0 {
                        warn!(interface, delta, ratio, "kernel dropped packets");
                    }
                    info!(interface, total_packets, total_drops, "capture totals");
                }
                last_sample = Instant::now();
            }
        }
        return;
    }
}

/// Spawns [`capture_loop`] on the blocking thread pool and awaits it.
pub async fn run_packet_source(
    interface: String,
    config: Arc<CaptureConfig>,
    session: Arc<SessionManager>,
    shutdown: Arc<AtomicBool>,
) {
    let result = tokio::task::spawn_blocking(move || capture_loop(interface, config, session, shutdown)).await;
    if let Err(err) = result {
        warn!(%err, "packet source task panicked");
    }
}
